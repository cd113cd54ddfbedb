//! Memoised match outcomes per (loader, type) pair.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;

/// Identifies the loading domain a type name is resolved in.
///
/// The same type name can describe different types under different loaders,
/// so cached outcomes are scoped to the pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoaderId(u64);

impl LoaderId {
    /// The bootstrap loading domain.
    pub const BOOTSTRAP: Self = Self(0);

    /// Creates a loader id from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Concurrent cache of match outcomes.
///
/// Reads take a shared lock and dominate; writes happen once per distinct
/// (loader, type) pair. Entries are never invalidated: a type's structure
/// does not change after it was first described.
#[derive(Default)]
pub struct MatchCache {
    entries: RwLock<HashMap<(LoaderId, String), bool>>,
}

impl MatchCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached outcome, if present.
    #[must_use]
    pub fn get(&self, loader: LoaderId, type_name: &str) -> Option<bool> {
        self.entries
            .read()
            .get(&(loader, type_name.to_string()))
            .copied()
    }

    /// Returns the cached outcome, computing and storing it on first use.
    ///
    /// Two threads racing on the same uncached pair may both run `compute`;
    /// both arrive at the same outcome for the same structure, so the second
    /// write is a no-op in effect.
    pub fn get_or_insert_with(
        &self,
        loader: LoaderId,
        type_name: &str,
        compute: impl FnOnce() -> bool,
    ) -> bool {
        if let Some(outcome) = self.get(loader, type_name) {
            return outcome;
        }
        let outcome = compute();
        self.entries
            .write()
            .insert((loader, type_name.to_string()), outcome);
        outcome
    }

    /// Returns the number of cached pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for MatchCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn outcome_is_computed_once_per_pair() {
        let cache = MatchCache::new();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        };

        assert!(cache.get_or_insert_with(LoaderId::new(1), "app.Worker", compute));
        assert!(cache.get_or_insert_with(LoaderId::new(1), "app.Worker", compute));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn pairs_are_scoped_by_loader() {
        let cache = MatchCache::new();
        cache.get_or_insert_with(LoaderId::new(1), "app.Worker", || true);
        cache.get_or_insert_with(LoaderId::new(2), "app.Worker", || false);

        assert_eq!(cache.get(LoaderId::new(1), "app.Worker"), Some(true));
        assert_eq!(cache.get(LoaderId::new(2), "app.Worker"), Some(false));
        assert_eq!(cache.get(LoaderId::BOOTSTRAP, "app.Worker"), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_reads_and_writes_settle() {
        let cache = Arc::new(MatchCache::new());
        let mut handles = Vec::new();
        for t in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    let name = format!("app.Type{}", i % 10);
                    cache.get_or_insert_with(LoaderId::new(t % 2), &name, || i % 2 == 0);
                }
            }));
        }
        for handle in handles {
            handle.join().expect("thread panicked");
        }
        assert_eq!(cache.len(), 20);
    }
}
