//! # VCR Module
//!
//! A registry of cassettes by identifier. Storage only: it never takes part
//! in recording or playback.

use crate::cassette::Cassette;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Cassettes indexed by [`Cassette::id`].
#[derive(Debug, Default)]
pub struct Vcr {
    cassettes: RwLock<HashMap<u64, Arc<Cassette>>>,
}

impl Vcr {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered cassettes.
    pub fn len(&self) -> usize {
        self.cassettes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cassettes.read().is_empty()
    }

    /// Returns a handle to the cassette registered under `id`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use callvcr_core::{Cassette, Vcr};
    ///
    /// let vcr = Vcr::new();
    /// vcr.add(Cassette::with_id(3));
    ///
    /// assert_eq!(vcr.get(3).map(|c| c.id()), Some(3));
    /// assert!(vcr.get(4).is_none());
    /// ```
    pub fn get(&self, id: u64) -> Option<Arc<Cassette>> {
        self.cassettes.read().get(&id).cloned()
    }

    /// Inserts a cassette under its identifier, returning any cassette it
    /// replaced.
    pub fn add(&self, cassette: impl Into<Arc<Cassette>>) -> Option<Arc<Cassette>> {
        let cassette = cassette.into();
        let id = cassette.id();
        debug!(cassette = id, "cassette added");
        self.cassettes.write().insert(id, cassette)
    }

    /// Removes the cassette with `id`, if present.
    pub fn delete(&self, id: u64) -> Option<Arc<Cassette>> {
        let removed = self.cassettes.write().remove(&id);
        if removed.is_some() {
            debug!(cassette = id, "cassette deleted");
        }
        removed
    }

    /// Identifiers of all registered cassettes, ascending.
    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.cassettes.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_vcr_is_empty() {
        let vcr = Vcr::new();
        assert_eq!(vcr.len(), 0);
        assert!(vcr.is_empty());
        assert!(vcr.get(1).is_none());
    }

    #[test]
    fn test_add_and_get() {
        let vcr = Vcr::new();
        let cassette = Arc::new(Cassette::new());

        assert!(vcr.add(Arc::clone(&cassette)).is_none());
        let got = vcr.get(cassette.id()).expect("registered");

        assert!(Arc::ptr_eq(&got, &cassette));
        assert_eq!(vcr.len(), 1);
    }

    #[test]
    fn test_add_overwrites_same_id() {
        let vcr = Vcr::new();
        vcr.add(Cassette::with_id(5));
        let replaced = vcr.add(Cassette::with_id(5));

        assert!(replaced.is_some());
        assert_eq!(vcr.len(), 1);
        assert_eq!(vcr.ids(), vec![5]);
    }

    #[test]
    fn test_delete() {
        let vcr = Vcr::new();
        let cassette = Cassette::new();
        let id = cassette.id();
        vcr.add(cassette);

        assert!(vcr.delete(id).is_some());
        assert_eq!(vcr.len(), 0);
        assert!(vcr.get(id).is_none());

        // Deleting again is a no-op.
        assert!(vcr.delete(id).is_none());
    }

    #[test]
    fn test_concurrent_adds() {
        let vcr = Vcr::new();
        std::thread::scope(|scope| {
            for base in 0..4u64 {
                let vcr = &vcr;
                scope.spawn(move || {
                    for i in 0..10 {
                        vcr.add(Cassette::with_id(base * 10 + i));
                    }
                });
            }
        });
        assert_eq!(vcr.len(), 40);
    }
}
