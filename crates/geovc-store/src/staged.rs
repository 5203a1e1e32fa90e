use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use geovc_types::ObjectId;

use crate::bulk::{BulkOpListener, BulkOutcome, CountingListener};
use crate::error::StoreResult;
use crate::forwarding::ForwardingObjectStore;
use crate::memory::InMemoryObjectStore;
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// An isolated, per-transaction overlay over a shared object pool.
///
/// Reads consult the private staging layer first, then the pool. Writes
/// land in the staging layer only, and are skipped when the pool already
/// holds the object. Nothing reaches the pool until [`publish`] runs, so
/// concurrent views never observe each other's pending objects.
///
/// [`publish`]: StagedObjectStore::publish
pub struct StagedObjectStore {
    id: Uuid,
    staging: InMemoryObjectStore,
    pool: ForwardingObjectStore,
}

impl StagedObjectStore {
    /// A view over a fixed shared pool.
    pub fn new(pool: Arc<dyn ObjectStore>) -> Self {
        Self::over(ForwardingObjectStore::to(pool))
    }

    /// A view over a lazily resolved pool.
    pub fn over(pool: ForwardingObjectStore) -> Self {
        let id = Uuid::now_v7();
        debug!(view = %id, "staged view opened");
        Self {
            id,
            staging: InMemoryObjectStore::new(),
            pool,
        }
    }

    /// Unique id of this view.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The shared pool this view publishes into.
    pub fn pool(&self) -> &ForwardingObjectStore {
        &self.pool
    }

    /// Ids of objects waiting to be published, sorted.
    pub fn staged_ids(&self) -> Vec<ObjectId> {
        self.staging.all_ids()
    }

    /// Number of objects waiting to be published.
    pub fn staged_len(&self) -> usize {
        self.staging.len()
    }

    /// Copy every staged object into the pool and report per-item outcomes.
    ///
    /// Objects that made it into the pool (inserted or already present) are
    /// dropped from the staging layer; failed ones stay staged so the
    /// publish can be retried.
    pub fn publish(&self) -> CountingListener {
        let mut report = CountingListener::new();
        self.publish_with(&mut report);
        report
    }

    /// Like [`publish`](Self::publish), forwarding every outcome to `listener`.
    pub fn publish_with(&self, listener: &mut dyn BulkOpListener) {
        let staged: Vec<StoredObject> = self.staging.all_objects();
        let mut published = Vec::with_capacity(staged.len());
        let mut failed = 0usize;
        let mut track = |id: &ObjectId, outcome: BulkOutcome| {
            match outcome {
                BulkOutcome::Failed(_) => failed += 1,
                _ => published.push(*id),
            }
            listener.on_item(id, outcome);
        };
        let inserted = self.pool.write_all(&staged, &mut track);
        for id in &published {
            // A poisoned lock leaves the object staged for the next attempt.
            let _ = self.staging.delete(id);
        }
        info!(
            view = %self.id,
            staged = staged.len(),
            inserted,
            failed,
            "staged view published"
        );
    }

    /// Drop every staged object. The pool is untouched.
    pub fn discard(&self) {
        let dropped = self.staging.len();
        self.staging.clear();
        debug!(view = %self.id, dropped, "staged view discarded");
    }
}

impl std::fmt::Debug for StagedObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedObjectStore")
            .field("id", &self.id)
            .field("staged", &self.staging.len())
            .finish()
    }
}

impl ObjectStore for StagedObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        match self.staging.read(id)? {
            Some(object) => Ok(Some(object)),
            None => self.pool.read(id),
        }
    }

    fn write(&self, object: &StoredObject) -> StoreResult<bool> {
        if self.pool.exists(&object.compute_id())? {
            return Ok(false);
        }
        self.staging.write(object)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.staging.exists(id)? || self.pool.exists(id)?)
    }

    /// Removes a staged object. Published objects are never deleted through
    /// a view.
    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        self.staging.delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::object::{RevFeature, RevObject};
    use geovc_types::FieldValue;
    use std::collections::HashSet;

    fn feature(n: i64) -> RevObject {
        RevFeature::new(vec![FieldValue::Int(n), FieldValue::from("staged")]).into()
    }

    fn pool() -> Arc<InMemoryObjectStore> {
        Arc::new(InMemoryObjectStore::new())
    }

    #[test]
    fn writes_stay_private_until_publish() {
        let shared = pool();
        let view = StagedObjectStore::new(shared.clone());
        let obj = feature(1);

        assert!(view.put(&obj).unwrap());
        assert!(view.exists(&obj.id()).unwrap());
        assert_eq!(view.get(&obj.id()).unwrap(), obj);
        assert!(!shared.exists(&obj.id()).unwrap());

        let report = view.publish();
        assert_eq!(report.inserted, 1);
        assert!(!report.has_failures());
        assert!(shared.exists(&obj.id()).unwrap());
        assert_eq!(view.staged_len(), 0);
        assert!(view.exists(&obj.id()).unwrap());
    }

    #[test]
    fn views_are_isolated_from_each_other() {
        let shared = pool();
        let a = StagedObjectStore::new(shared.clone());
        let b = StagedObjectStore::new(shared.clone());
        assert_ne!(a.id(), b.id());

        a.put(&feature(1)).unwrap();
        assert!(!b.exists(&feature(1).id()).unwrap());
        assert!(matches!(b.get(&feature(1).id()), Err(StoreError::NotFound(_))));

        a.publish();
        assert!(b.exists(&feature(1).id()).unwrap());
    }

    #[test]
    fn reads_fall_through_to_pool() {
        let shared = pool();
        shared.put(&feature(5)).unwrap();
        let view = StagedObjectStore::new(shared.clone());
        assert_eq!(view.get(&feature(5).id()).unwrap(), feature(5));
    }

    #[test]
    fn writes_already_in_pool_are_skipped() {
        let shared = pool();
        shared.put(&feature(2)).unwrap();
        let view = StagedObjectStore::new(shared.clone());
        assert!(!view.put(&feature(2)).unwrap());
        assert_eq!(view.staged_len(), 0);
    }

    #[test]
    fn discard_leaves_pool_untouched() {
        let shared = pool();
        shared.put(&feature(0)).unwrap();
        let view = StagedObjectStore::new(shared.clone());
        for n in 1..5 {
            view.put(&feature(n)).unwrap();
        }
        assert_eq!(view.staged_len(), 4);
        view.discard();
        assert_eq!(view.staged_len(), 0);
        assert_eq!(shared.len(), 1);
        assert!(!view.exists(&feature(1).id()).unwrap());
    }

    #[test]
    fn delete_only_touches_staging() {
        let shared = pool();
        shared.put(&feature(1)).unwrap();
        let view = StagedObjectStore::new(shared.clone());
        view.put(&feature(2)).unwrap();
        assert!(!view.delete(&feature(1).id()).unwrap());
        assert!(view.delete(&feature(2).id()).unwrap());
        assert!(shared.exists(&feature(1).id()).unwrap());
    }

    #[test]
    fn publish_reports_objects_that_raced_in() {
        let shared = pool();
        let view = StagedObjectStore::new(shared.clone());
        view.put(&feature(1)).unwrap();
        view.put(&feature(2)).unwrap();
        // Another writer publishes the same content first.
        shared.put(&feature(2)).unwrap();

        let mut seen = HashSet::new();
        let mut listener = |id: &ObjectId, outcome: BulkOutcome| {
            seen.insert((*id, outcome));
        };
        view.publish_with(&mut listener);
        assert!(seen.contains(&(feature(1).id(), BulkOutcome::Inserted)));
        assert!(seen.contains(&(feature(2).id(), BulkOutcome::AlreadyExisted)));
        assert_eq!(shared.len(), 2);
    }

    #[test]
    fn concurrent_views_publish_independently() {
        use std::thread;

        let shared = pool();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let shared = shared.clone();
                thread::spawn(move || {
                    let view = StagedObjectStore::new(shared);
                    for n in 0..10 {
                        view.put(&feature(t * 100 + n)).unwrap();
                    }
                    view.publish().inserted
                })
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 40);
        assert_eq!(shared.len(), 40);
    }
}
