//! Process-wide rules for which executors get their tasks wrapped.
//!
//! Exclusion exists for event-loop style executors whose queued tasks never
//! complete in the usual sense; capturing a context per task there would pin
//! contexts for the executor's lifetime. Rules come in three shapes: an
//! exact type-name deny, a name-prefix deny, and a per-instance opt-out held
//! behind a weak reference so the registry never keeps an executor alive.

use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Decides whether tasks submitted to an executor are wrapped.
pub struct ExecutorRegistry {
    all_enabled: AtomicBool,
    included: RwLock<HashSet<String>>,
    denied_names: RwLock<HashSet<String>>,
    denied_prefixes: RwLock<Vec<String>>,
    disabled_instances: Mutex<HashMap<usize, Weak<dyn Any + Send + Sync>>>,
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self {
            all_enabled: AtomicBool::new(true),
            included: RwLock::new(HashSet::new()),
            denied_names: RwLock::new(HashSet::new()),
            denied_prefixes: RwLock::new(Vec::new()),
            disabled_instances: Mutex::new(HashMap::new()),
        }
    }
}

impl ExecutorRegistry {
    /// Creates a registry that permits every executor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns blanket wrapping on or off. With it off, only explicitly
    /// included names are wrapped.
    pub fn set_all_enabled(&self, enabled: bool) {
        self.all_enabled.store(enabled, Ordering::Release);
    }

    /// Force-includes an executor type name, overriding deny rules.
    pub fn include(&self, name: impl Into<String>) {
        self.included.write().insert(name.into());
    }

    /// Denies an exact executor type name.
    pub fn deny_name(&self, name: impl Into<String>) {
        self.denied_names.write().insert(name.into());
    }

    /// Denies every executor type name with this prefix.
    pub fn deny_prefix(&self, prefix: impl Into<String>) {
        self.denied_prefixes.write().push(prefix.into());
    }

    /// Opts one executor instance out of wrapping.
    ///
    /// The instance is held weakly and the entry is never removed; a dead
    /// entry simply stops matching.
    pub fn disable_executor_for_wrapped_tasks<E: Any + Send + Sync>(&self, executor: &Arc<E>) {
        let key = Arc::as_ptr(executor) as usize;
        let erased: Arc<dyn Any + Send + Sync> = executor.clone();
        self.disabled_instances
            .lock()
            .insert(key, Arc::downgrade(&erased));
        tracing::debug!(key, "executor instance opted out of task wrapping");
    }

    /// Returns true when this instance opted out and is still alive.
    #[must_use]
    pub fn is_instance_disabled<E: Any + Send + Sync>(&self, executor: &Arc<E>) -> bool {
        let key = Arc::as_ptr(executor) as usize;
        self.disabled_instances
            .lock()
            .get(&key)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Returns true when tasks submitted under this executor type name may
    /// carry capture state. Inclusion wins over every deny rule.
    #[must_use]
    pub fn permits_name(&self, name: &str) -> bool {
        if self.included.read().contains(name) {
            return true;
        }
        if !self.all_enabled.load(Ordering::Acquire) {
            return false;
        }
        if self.denied_names.read().contains(name) {
            return false;
        }
        !self
            .denied_prefixes
            .read()
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("all_enabled", &self.all_enabled.load(Ordering::Acquire))
            .field("included", &self.included.read().len())
            .field("denied_names", &self.denied_names.read().len())
            .field("denied_prefixes", &self.denied_prefixes.read().len())
            .field("disabled_instances", &self.disabled_instances.lock().len())
            .finish()
    }
}
