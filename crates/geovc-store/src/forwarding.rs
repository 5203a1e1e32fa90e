use std::sync::Arc;

use geovc_types::ObjectId;

use crate::bulk::BulkOpListener;
use crate::error::StoreResult;
use crate::object::{
    ObjectKind, RevCommit, RevFeature, RevFeatureType, RevObject, RevTag, RevTree, StoredObject,
};
use crate::traits::ObjectStore;

/// Resolves the backend a [`ForwardingObjectStore`] delegates to.
pub type StoreSupplier = Arc<dyn Fn() -> Arc<dyn ObjectStore> + Send + Sync>;

/// Store adapter that delegates every call to a lazily resolved backend.
///
/// The supplier runs on each call, so the backend can be swapped (for
/// example, re-pointed at a freshly opened repository) without rebuilding
/// the views layered on top of it.
#[derive(Clone)]
pub struct ForwardingObjectStore {
    supplier: StoreSupplier,
}

impl ForwardingObjectStore {
    pub fn new<F>(supplier: F) -> Self
    where
        F: Fn() -> Arc<dyn ObjectStore> + Send + Sync + 'static,
    {
        Self {
            supplier: Arc::new(supplier),
        }
    }

    /// Forward to a fixed backend.
    pub fn to(store: Arc<dyn ObjectStore>) -> Self {
        Self::new(move || Arc::clone(&store))
    }

    fn subject(&self) -> Arc<dyn ObjectStore> {
        (self.supplier)()
    }
}

impl std::fmt::Debug for ForwardingObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingObjectStore").finish_non_exhaustive()
    }
}

impl ObjectStore for ForwardingObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        self.subject().read(id)
    }

    fn write(&self, object: &StoredObject) -> StoreResult<bool> {
        self.subject().write(object)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        self.subject().exists(id)
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        self.subject().delete(id)
    }

    fn get_if_present(&self, id: &ObjectId) -> StoreResult<Option<RevObject>> {
        self.subject().get_if_present(id)
    }

    fn get(&self, id: &ObjectId) -> StoreResult<RevObject> {
        self.subject().get(id)
    }

    fn put(&self, object: &RevObject) -> StoreResult<bool> {
        self.subject().put(object)
    }

    fn get_tree(&self, id: &ObjectId) -> StoreResult<RevTree> {
        self.subject().get_tree(id)
    }

    fn get_commit(&self, id: &ObjectId) -> StoreResult<RevCommit> {
        self.subject().get_commit(id)
    }

    fn get_feature(&self, id: &ObjectId) -> StoreResult<RevFeature> {
        self.subject().get_feature(id)
    }

    fn get_feature_type(&self, id: &ObjectId) -> StoreResult<RevFeatureType> {
        self.subject().get_feature_type(id)
    }

    fn get_tag(&self, id: &ObjectId) -> StoreResult<RevTag> {
        self.subject().get_tag(id)
    }

    fn read_kind(&self, id: &ObjectId, expected: ObjectKind) -> StoreResult<StoredObject> {
        self.subject().read_kind(id, expected)
    }

    fn write_all(&self, objects: &[StoredObject], listener: &mut dyn BulkOpListener) -> usize {
        self.subject().write_all(objects, listener)
    }

    fn put_all(&self, objects: &[RevObject], listener: &mut dyn BulkOpListener) -> usize {
        self.subject().put_all(objects, listener)
    }

    fn get_all(&self, ids: &[ObjectId], listener: &mut dyn BulkOpListener) -> Vec<RevObject> {
        self.subject().get_all(ids, listener)
    }

    fn delete_all(&self, ids: &[ObjectId], listener: &mut dyn BulkOpListener) -> usize {
        self.subject().delete_all(ids, listener)
    }
}
