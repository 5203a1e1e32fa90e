use geovc_types::ObjectId;

use crate::bulk::{BulkOpListener, BulkOutcome};
use crate::error::{StoreError, StoreResult};
use crate::object::{
    ObjectKind, RevCommit, RevFeature, RevFeatureType, RevObject, RevTag, RevTree, StoredObject,
};

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written. Content-addressing guarantees this:
///   the same data always produces the same ID.
/// - A read either finds the complete object or nothing; partially written
///   objects are never observable.
/// - Concurrent reads are always safe (objects are immutable).
/// - The raw layer never interprets object contents; `get`/`put` decode and
///   encode on top of it.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content-addressed ID.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    /// Returns `Err` on I/O failure or data corruption.
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object. Returns `true` if it was newly stored, `false` if an
    /// object with the same id was already present (idempotent).
    fn write(&self, object: &StoredObject) -> StoreResult<bool>;

    /// Check whether an object exists in the store.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Delete an object by ID. Returns `true` if the object existed.
    ///
    /// This is intended for garbage collection only. Deletion of
    /// referenced objects can corrupt the store.
    fn delete(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Decode the object with this id, if present.
    fn get_if_present(&self, id: &ObjectId) -> StoreResult<Option<RevObject>> {
        match self.read(id)? {
            Some(stored) => Ok(Some(RevObject::decode(&stored)?)),
            None => Ok(None),
        }
    }

    /// Decode the object with this id, failing with `NotFound` if absent.
    fn get(&self, id: &ObjectId) -> StoreResult<RevObject> {
        self.get_if_present(id)?.ok_or(StoreError::NotFound(*id))
    }

    /// Encode and store an object. Returns `true` if newly stored.
    fn put(&self, object: &RevObject) -> StoreResult<bool> {
        self.write(&object.encode())
    }

    fn get_tree(&self, id: &ObjectId) -> StoreResult<RevTree> {
        RevTree::from_stored_object(&self.read_kind(id, ObjectKind::Tree)?)
    }

    fn get_commit(&self, id: &ObjectId) -> StoreResult<RevCommit> {
        RevCommit::from_stored_object(&self.read_kind(id, ObjectKind::Commit)?)
    }

    fn get_feature(&self, id: &ObjectId) -> StoreResult<RevFeature> {
        RevFeature::from_stored_object(&self.read_kind(id, ObjectKind::Feature)?)
    }

    fn get_feature_type(&self, id: &ObjectId) -> StoreResult<RevFeatureType> {
        RevFeatureType::from_stored_object(&self.read_kind(id, ObjectKind::FeatureType)?)
    }

    fn get_tag(&self, id: &ObjectId) -> StoreResult<RevTag> {
        RevTag::from_stored_object(&self.read_kind(id, ObjectKind::Tag)?)
    }

    /// Read raw bytes, failing with `NotFound` or `UnexpectedKind`.
    fn read_kind(&self, id: &ObjectId, expected: ObjectKind) -> StoreResult<StoredObject> {
        let stored = self.read(id)?.ok_or(StoreError::NotFound(*id))?;
        if stored.kind != expected {
            return Err(StoreError::UnexpectedKind {
                id: *id,
                expected,
                actual: stored.kind,
            });
        }
        Ok(stored)
    }

    /// Write a batch of raw objects, reporting `Inserted`, `AlreadyExisted`
    /// or `Failed` per item. Returns the number of newly stored objects.
    fn write_all(&self, objects: &[StoredObject], listener: &mut dyn BulkOpListener) -> usize {
        let mut inserted = 0;
        for object in objects {
            let id = object.compute_id();
            match self.write(object) {
                Ok(true) => {
                    inserted += 1;
                    listener.on_item(&id, BulkOutcome::Inserted);
                }
                Ok(false) => listener.on_item(&id, BulkOutcome::AlreadyExisted),
                Err(e) => listener.on_item(&id, BulkOutcome::Failed(e.to_string())),
            }
        }
        inserted
    }

    /// Store a batch of objects. A failing item never aborts the rest.
    fn put_all(&self, objects: &[RevObject], listener: &mut dyn BulkOpListener) -> usize {
        let encoded: Vec<StoredObject> = objects.iter().map(RevObject::encode).collect();
        self.write_all(&encoded, listener)
    }

    /// Read a batch of objects, reporting `Found`, `NotFound` or `Failed`
    /// per id. Returns the objects found, in request order.
    fn get_all(&self, ids: &[ObjectId], listener: &mut dyn BulkOpListener) -> Vec<RevObject> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_if_present(id) {
                Ok(Some(object)) => {
                    listener.on_item(id, BulkOutcome::Found);
                    found.push(object);
                }
                Ok(None) => listener.on_item(id, BulkOutcome::NotFound),
                Err(e) => listener.on_item(id, BulkOutcome::Failed(e.to_string())),
            }
        }
        found
    }

    /// Delete a batch of objects, reporting `Deleted`, `NotFound` or
    /// `Failed` per id. Returns the number deleted.
    fn delete_all(&self, ids: &[ObjectId], listener: &mut dyn BulkOpListener) -> usize {
        let mut deleted = 0;
        for id in ids {
            match self.delete(id) {
                Ok(true) => {
                    deleted += 1;
                    listener.on_item(id, BulkOutcome::Deleted);
                }
                Ok(false) => listener.on_item(id, BulkOutcome::NotFound),
                Err(e) => listener.on_item(id, BulkOutcome::Failed(e.to_string())),
            }
        }
        deleted
    }
}
