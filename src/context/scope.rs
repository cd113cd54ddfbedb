//! The ambient context slot and its RAII scope guard.
//!
//! Each thread carries a stack of attached contexts. [`attach`] pushes an
//! entry and returns a [`Scope`]; dropping the scope removes that entry.
//! Closes are expected to nest LIFO; an out-of-order close is detected,
//! logged, and repaired by removing only the offending entry so inner scopes
//! keep their contexts and later closes still restore correctly. After the
//! outermost close the ambient context equals whatever it was before the
//! outermost attach.

use super::Context;
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;

struct ScopeEntry {
    token: u64,
    context: Context,
}

thread_local! {
    static AMBIENT: RefCell<Vec<ScopeEntry>> = const { RefCell::new(Vec::new()) };
    static NEXT_TOKEN: Cell<u64> = const { Cell::new(1) };
}

/// Returns the ambient context of the calling thread.
#[must_use]
pub fn current() -> Context {
    AMBIENT.with(|stack| {
        stack
            .borrow()
            .last()
            .map_or_else(Context::root, |entry| entry.context.clone())
    })
}

/// Installs the context as ambient and returns the guard that undoes it.
pub(crate) fn attach(context: Context) -> Scope {
    let token = NEXT_TOKEN.with(|next| {
        let t = next.get();
        next.set(t.wrapping_add(1));
        t
    });
    AMBIENT.with(|stack| {
        stack.borrow_mut().push(ScopeEntry { token, context });
    });
    Scope {
        token,
        _not_send: PhantomData,
    }
}

/// Guard restoring the prior ambient context when dropped.
///
/// A scope is bound to the thread that opened it and is closed exactly once,
/// on drop.
#[derive(Debug)]
pub struct Scope {
    token: u64,
    // Scopes must close on the thread that opened them.
    _not_send: PhantomData<*const ()>,
}

impl Scope {
    /// Closes the scope now instead of at end of block.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        AMBIENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.iter().rposition(|entry| entry.token == self.token) {
                Some(pos) if pos + 1 == stack.len() => {
                    stack.pop();
                }
                Some(pos) => {
                    tracing::warn!(
                        depth = stack.len() - pos,
                        "scope closed out of order, repairing ambient stack"
                    );
                    stack.remove(pos);
                }
                None => {
                    tracing::debug!("scope already detached from ambient stack");
                }
            }
        });
    }
}
