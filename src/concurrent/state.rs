//! Per-task capture of the submitting context.
//!
//! A [`TaskState`] moves through `empty -> attached -> consumed`, with a
//! short-lived writing phase guarding the slot while the context is stored.
//! The first attach wins; later attempts are dropped and logged at debug
//! level. Consume and cancel both clear the slot, so a captured context is
//! handed out at most once.

use crate::context::Context;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const ATTACHED: u8 = 2;
const CONSUMED: u8 = 3;

/// The capture state of one submitted task.
#[derive(Debug, Default)]
pub struct TaskState {
    phase: AtomicU8,
    parent: Mutex<Option<Context>>,
}

impl TaskState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the submitting context. Returns true when this call won the
    /// single attach; a losing concurrent or repeated attach is dropped.
    pub fn attach_parent(&self, parent: Context) -> bool {
        if self
            .phase
            .compare_exchange(EMPTY, WRITING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("task state already attached, dropping second capture");
            return false;
        }
        *self.parent.lock() = Some(parent);
        // A concurrent cancel may have closed the state while writing.
        if self
            .phase
            .compare_exchange(WRITING, ATTACHED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.parent.lock().take();
            return false;
        }
        true
    }

    /// Takes the captured context, at most once.
    pub fn consume(&self) -> Option<Context> {
        if self
            .phase
            .compare_exchange(ATTACHED, CONSUMED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        self.parent.lock().take()
    }

    /// Discards any captured context and closes the state.
    ///
    /// Used when the submission that captured the context failed.
    pub fn cancel(&self) {
        let previous = self.phase.swap(CONSUMED, Ordering::AcqRel);
        if previous == ATTACHED || previous == WRITING {
            self.parent.lock().take();
        }
    }

    /// Returns true while a captured context is waiting to be consumed.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.phase.load(Ordering::Acquire) == ATTACHED
    }

    /// Returns true once the state was consumed or cancelled.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.phase.load(Ordering::Acquire) == CONSUMED
    }
}
