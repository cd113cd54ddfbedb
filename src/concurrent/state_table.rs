//! Out-of-band association of tasks with their capture state.
//!
//! The table keys on the task allocation's address and holds only a weak
//! reference to the task, so it never keeps an otherwise-collectible task
//! alive. A dead entry whose address was reused is detected through the dead
//! weak reference and replaced.

use super::state::TaskState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

struct TableEntry<K: ?Sized> {
    task: Weak<K>,
    state: Arc<TaskState>,
}

/// Maps task identity to its [`TaskState`].
pub struct StateTable<K: ?Sized> {
    entries: Mutex<HashMap<usize, TableEntry<K>>>,
}

impl<K: ?Sized> Default for StateTable<K> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: ?Sized> StateTable<K> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(task: &Arc<K>) -> usize {
        Arc::as_ptr(task).cast::<()>() as usize
    }

    /// Returns the task's state, creating it on first use.
    #[must_use]
    pub fn state_of(&self, task: &Arc<K>) -> Arc<TaskState> {
        let key = Self::key(task);
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&key) {
            // A dead weak at this address means the address was reused.
            if entry.task.strong_count() > 0 {
                return Arc::clone(&entry.state);
            }
        }
        let state = Arc::new(TaskState::new());
        entries.insert(
            key,
            TableEntry {
                task: Arc::downgrade(task),
                state: Arc::clone(&state),
            },
        );
        state
    }

    /// Returns the task's state only when one was already created.
    #[must_use]
    pub fn existing_state(&self, task: &Arc<K>) -> Option<Arc<TaskState>> {
        let entries = self.entries.lock();
        let entry = entries.get(&Self::key(task))?;
        if entry.task.strong_count() == 0 {
            return None;
        }
        Some(Arc::clone(&entry.state))
    }

    /// Drops the task's entry, if any.
    pub fn remove(&self, task: &Arc<K>) {
        self.entries.lock().remove(&Self::key(task));
    }

    /// Drops entries whose task is gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.task.strong_count() > 0);
        before - entries.len()
    }

    /// Returns the number of live and dead entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true when the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<K: ?Sized> fmt::Debug for StateTable<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTable")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn same_task_yields_same_state() {
        let table: StateTable<String> = StateTable::new();
        let task = Arc::new("task-a".to_string());

        let first = table.state_of(&task);
        let second = table.state_of(&task);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn distinct_tasks_get_distinct_states() {
        let table: StateTable<String> = StateTable::new();
        let a = Arc::new("a".to_string());
        let b = Arc::new("b".to_string());

        let state_a = table.state_of(&a);
        let state_b = table.state_of(&b);
        assert!(!Arc::ptr_eq(&state_a, &state_b));
    }

    #[test]
    fn existing_state_does_not_create() {
        let table: StateTable<String> = StateTable::new();
        let task = Arc::new("task".to_string());

        assert!(table.existing_state(&task).is_none());
        let created = table.state_of(&task);
        let found = table.existing_state(&task).expect("state exists");
        assert!(Arc::ptr_eq(&created, &found));
    }

    #[test]
    fn table_does_not_keep_tasks_alive() {
        let table: StateTable<String> = StateTable::new();
        let task = Arc::new("short-lived".to_string());
        let weak = Arc::downgrade(&task);

        let state = table.state_of(&task);
        state.attach_parent(Context::root());
        drop(task);

        assert!(weak.upgrade().is_none());
        assert_eq!(table.prune(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn remove_forgets_the_entry() {
        let table: StateTable<String> = StateTable::new();
        let task = Arc::new("task".to_string());
        table.state_of(&task).attach_parent(Context::root());

        table.remove(&task);
        assert!(table.existing_state(&task).is_none());
        assert!(table.is_empty());
    }
}
