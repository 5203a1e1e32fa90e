//! In-memory reference store.
//!
//! [`InMemoryRefStore`] keeps refs in a `BTreeMap` behind a `RwLock`.
//! Compare-and-swap runs its check and its write under one write lock, so
//! of several writers racing from the same expected head exactly one wins.

use std::collections::BTreeMap;
use std::sync::RwLock;

use geovc_types::ObjectId;
use tracing::debug;

use crate::error::{RefError, Result};
use crate::traits::{check_expected, check_write, RefStore};
use crate::types::Ref;

/// An in-memory implementation of [`RefStore`]. Data is lost on drop.
#[derive(Debug, Default)]
pub struct InMemoryRefStore {
    refs: RwLock<BTreeMap<String, Ref>>,
}

impl InMemoryRefStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefStore for InMemoryRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<Ref>> {
        let refs = self.refs.read().map_err(|_| RefError::LockPoisoned)?;
        Ok(refs.get(name).cloned())
    }

    fn compare_and_swap(&self, name: &str, expected: Option<ObjectId>, new: &Ref) -> Result<()> {
        let mut refs = self.refs.write().map_err(|_| RefError::LockPoisoned)?;
        let existing = refs.get(name);
        check_write(name, new, existing)?;
        check_expected(name, expected, existing)?;
        refs.insert(name.to_string(), new.clone());
        debug!(name, commit = %new.commit_id().short_hex(), "ref updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    fn id(n: u8) -> ObjectId {
        ObjectId::from_bytes(&[n])
    }

    // ---- Basic reads and writes ----

    #[test]
    fn create_and_read_branch_ref() {
        let store = InMemoryRefStore::new();
        store
            .compare_and_swap("refs/heads/main", None, &Ref::branch("main", id(1)))
            .unwrap();

        let read = store.read_ref("refs/heads/main").unwrap().unwrap();
        assert!(read.is_branch());
        assert_eq!(read.commit_id(), id(1));
        assert!(store.read_ref("refs/heads/nope").unwrap().is_none());
    }

    #[test]
    fn cas_rejects_mismatched_names() {
        let store = InMemoryRefStore::new();
        let err = store
            .compare_and_swap("refs/heads/main", None, &Ref::branch("dev", id(1)))
            .unwrap_err();
        assert!(matches!(err, RefError::InvalidBranchName { .. }));
        assert!(store
            .compare_and_swap("refs/heads/bad..name", None, &Ref::branch("bad..name", id(1)))
            .is_err());
        assert!(matches!(
            store.update_branch("bad..name", None, id(1)),
            Err(RefError::InvalidBranchName { .. })
        ));
        assert!(store.read_ref("refs/heads/main").unwrap().is_none());
    }

    // ---- Tags ----

    #[test]
    fn tag_is_immutable() {
        let store = InMemoryRefStore::new();
        let name = "refs/tags/v1.0.0";
        store
            .compare_and_swap(name, None, &Ref::tag("v1.0.0", id(3), None))
            .unwrap();
        let err = store
            .compare_and_swap(name, Some(id(3)), &Ref::tag("v1.0.0", id(4), None))
            .unwrap_err();
        assert!(matches!(err, RefError::TagImmutable { .. }));
        assert_eq!(store.read_ref(name).unwrap().unwrap().commit_id(), id(3));
    }

    // ---- Compare-and-swap ----

    #[test]
    fn cas_creates_and_advances() {
        let store = InMemoryRefStore::new();
        store.update_branch("main", None, id(1)).unwrap();
        store.update_branch("main", Some(id(1)), id(2)).unwrap();
        assert_eq!(store.branch_head("main").unwrap(), Some(id(2)));
    }

    #[test]
    fn cas_with_stale_expectation_fails() {
        let store = InMemoryRefStore::new();
        store.update_branch("main", None, id(1)).unwrap();
        store.update_branch("main", Some(id(1)), id(2)).unwrap();

        let err = store.update_branch("main", Some(id(1)), id(3)).unwrap_err();
        match err {
            RefError::StaleRef {
                name,
                expected,
                actual,
            } => {
                assert_eq!(name, "refs/heads/main");
                assert_eq!(expected, Some(id(1)));
                assert_eq!(actual, Some(id(2)));
            }
            other => panic!("expected StaleRef, got {other}"),
        }
        let err = store.update_branch("main", None, id(3)).unwrap_err();
        assert!(matches!(err, RefError::StaleRef { .. }));
        assert_eq!(store.branch_head("main").unwrap(), Some(id(2)));
    }

    #[test]
    fn concurrent_cas_has_one_winner() {
        let store = Arc::new(InMemoryRefStore::new());
        store.update_branch("main", None, id(0)).unwrap();
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (1..=8u8)
            .map(|n| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.update_branch("main", Some(id(0)), id(n)).is_ok()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
        assert_ne!(store.branch_head("main").unwrap(), Some(id(0)));
    }

    // ---- Resolution ----

    #[test]
    fn resolve_specs() {
        let store = InMemoryRefStore::new();
        store.update_branch("main", None, id(1)).unwrap();
        store
            .compare_and_swap("refs/tags/v1", None, &Ref::tag("v1", id(5), None))
            .unwrap();

        assert_eq!(store.resolve("main").unwrap(), id(1));
        assert_eq!(store.resolve("refs/heads/main").unwrap(), id(1));
        assert_eq!(store.resolve("v1").unwrap(), id(5));
        assert!(matches!(
            store.resolve("HEAD"),
            Err(RefError::NotFound { .. })
        ));
        assert!(matches!(
            store.resolve("missing"),
            Err(RefError::NotFound { .. })
        ));
    }
}
