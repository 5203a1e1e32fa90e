//! Index definition, creation, update and removal.

use std::collections::BTreeMap;

use tracing::info;

use geovc_store::{Node, RevTree};
use geovc_tree::{load_tree, Partitioner};
use geovc_types::{AttributeType, FieldValue, ObjectId};

use crate::attribute::value_key;
use crate::bounds::resolve_bounds;
use crate::build::{load_feature_type, IndexEngine};
use crate::error::{IndexError, IndexResult};
use crate::index::Index;
use crate::info::{IndexInfo, IndexType, MetadataValue, BOUNDS_KEY};

/// Parameters of [`IndexEngine::create_index`].
///
/// Every field except `metadata` and `index_history` is required, and
/// `canonical_tree` may be left out when `index_history` is set. Missing
/// ones are reported as [`IndexError::Validation`] before the store is read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateIndexRequest {
    pub tree_name: Option<String>,
    pub attribute_name: Option<String>,
    pub index_type: Option<IndexType>,
    /// Canonical tree to index. With `index_history`, the tree expected at
    /// the branch head, checked before anything is built.
    pub canonical_tree: Option<ObjectId>,
    /// Feature type of the canonical tree's features.
    pub feature_type_id: Option<ObjectId>,
    pub metadata: BTreeMap<String, MetadataValue>,
    /// Index every commit of this branch instead of only `canonical_tree`.
    pub index_history: Option<String>,
}

impl CreateIndexRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree_name(mut self, name: impl Into<String>) -> Self {
        self.tree_name = Some(name.into());
        self
    }

    pub fn attribute_name(mut self, name: impl Into<String>) -> Self {
        self.attribute_name = Some(name.into());
        self
    }

    pub fn index_type(mut self, index_type: IndexType) -> Self {
        self.index_type = Some(index_type);
        self
    }

    pub fn canonical_tree(mut self, id: ObjectId) -> Self {
        self.canonical_tree = Some(id);
        self
    }

    pub fn feature_type_id(mut self, id: ObjectId) -> Self {
        self.feature_type_id = Some(id);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn index_history(mut self, branch: impl Into<String>) -> Self {
        self.index_history = Some(branch.into());
        self
    }
}

fn required<T>(value: Option<T>, field: &str) -> IndexResult<T> {
    value.ok_or_else(|| IndexError::Validation(format!("{field} is required")))
}

fn required_name(value: Option<String>, field: &str) -> IndexResult<String> {
    let value = required(value, field)?;
    if value.trim().is_empty() {
        return Err(IndexError::Validation(format!("{field} must not be empty")));
    }
    Ok(value)
}

/// What a create request indexes.
enum Scope {
    Tree(ObjectId),
    History {
        branch: String,
        expected_head_tree: Option<ObjectId>,
    },
}

fn required_id(value: Option<ObjectId>, field: &str) -> IndexResult<ObjectId> {
    let value = required(value, field)?;
    if value.is_null() {
        return Err(IndexError::Validation(format!("{field} must not be the null id")));
    }
    Ok(value)
}

impl IndexEngine<'_> {
    /// Persist an index definition, or return the identical one already
    /// stored.
    ///
    /// Fails with [`IndexError::Validation`] on empty names and with
    /// [`IndexError::State`] if a conflicting definition exists.
    pub fn create_index_info(&self, info: IndexInfo) -> IndexResult<IndexInfo> {
        if info.tree_name.trim().is_empty() {
            return Err(IndexError::Validation("tree name must not be empty".into()));
        }
        if info.attribute_name.trim().is_empty() {
            return Err(IndexError::Validation("attribute name must not be empty".into()));
        }
        if let Some(bounds) = info.bounds() {
            if !bounds.is_valid() {
                return Err(IndexError::Validation(format!(
                    "{info} has invalid bounds {bounds:?}"
                )));
            }
        }
        self.db.create_index_info(info)
    }

    /// Define an index and build it.
    ///
    /// Quadtree indexes without `@bounds` metadata take the bounds of the
    /// geometry attribute's CRS. The result points at the index tree of
    /// `canonical_tree`, or of the branch head when indexing history. A
    /// history request naming a `canonical_tree` that is not the tree at the
    /// branch head fails with [`IndexError::State`] before any definition is
    /// stored.
    pub fn create_index(&self, request: CreateIndexRequest) -> IndexResult<Index> {
        let tree_name = required_name(request.tree_name, "tree name")?;
        let attribute_name = required_name(request.attribute_name, "attribute name")?;
        let index_type = required(request.index_type, "index type")?;
        let scope = match request.index_history {
            Some(branch) => Scope::History {
                branch,
                expected_head_tree: request
                    .canonical_tree
                    .map(|id| required_id(Some(id), "canonical tree"))
                    .transpose()?,
            },
            None => Scope::Tree(required_id(request.canonical_tree, "canonical tree")?),
        };
        let feature_type_id = required_id(request.feature_type_id, "feature type id")?;

        if let Scope::History {
            branch,
            expected_head_tree: Some(expected),
        } = &scope
        {
            let head_tree = self.head_canonical_tree(&tree_name, branch)?;
            if head_tree != Some(*expected) {
                return Err(IndexError::State(format!(
                    "canonical tree {expected} is not the {tree_name} tree at the head of {branch}"
                )));
            }
        }

        let mut info = IndexInfo {
            tree_name,
            attribute_name,
            index_type,
            metadata: request.metadata,
        };
        if index_type == IndexType::QuadTree && !info.metadata.contains_key(BOUNDS_KEY) {
            let bounds = self.crs_bounds(&info, &feature_type_id)?;
            info.metadata.insert(BOUNDS_KEY.to_string(), bounds.into());
        }
        let info = self.create_index_info(info)?;

        let indexed_tree_id = match &scope {
            Scope::History { branch, .. } => self.build_full_history_index(&info, branch)?.head_indexed_tree,
            Scope::Tree(canonical) => self.build_index(&info, &RevTree::empty_id(), canonical, &feature_type_id)?,
        };
        info!(index = %info, indexed = %indexed_tree_id.short_hex(), "index created");
        Ok(Index::new(info, indexed_tree_id))
    }

    /// The canonical tree at `tree_name` in the head commit of `branch`.
    fn head_canonical_tree(&self, tree_name: &str, branch: &str) -> IndexResult<Option<ObjectId>> {
        let head = self.refs.resolve(branch)?;
        let root = self.store.get_commit(&head)?.tree_id;
        Ok(self.tree_ops().resolve_tree_id(&root, tree_name)?)
    }

    fn crs_bounds(&self, info: &IndexInfo, feature_type_id: &ObjectId) -> IndexResult<geovc_types::Envelope> {
        let feature_type = load_feature_type(self.store, feature_type_id)?;
        let (_, descriptor) = feature_type.attribute(&info.attribute_name).ok_or_else(|| {
            IndexError::Validation(format!(
                "feature type {} has no attribute {}",
                feature_type.name, info.attribute_name
            ))
        })?;
        if descriptor.binding != AttributeType::Geometry {
            return Err(IndexError::Validation(format!(
                "{info}: attribute is a {}, not a geometry",
                descriptor.binding
            )));
        }
        let crs = descriptor.crs.as_deref().ok_or_else(|| IndexError::ReferenceResolution {
            tree: info.tree_name.clone(),
            attribute: info.attribute_name.clone(),
            crs: String::new(),
            reason: "geometry attribute has no CRS".into(),
        })?;
        resolve_bounds(self.bounds, &info.tree_name, &info.attribute_name, crs)
    }

    /// Index `new_canonical` with the existing index on
    /// `tree_name.attribute_name`, reusing the index tree of `old_canonical`.
    pub fn update_index(
        &self,
        tree_name: &str,
        attribute_name: &str,
        old_canonical: &ObjectId,
        new_canonical: &ObjectId,
        feature_type_id: &ObjectId,
    ) -> IndexResult<Index> {
        let info = self
            .db
            .get_index_info(tree_name, attribute_name)?
            .ok_or_else(|| IndexError::NotFound(IndexInfo::id_for(tree_name, attribute_name)))?;
        let indexed = self.build_index(&info, old_canonical, new_canonical, feature_type_id)?;
        Ok(Index::new(info, indexed))
    }

    /// The index tree already built for `canonical`, if any.
    pub fn index_for(&self, tree_name: &str, attribute_name: &str, canonical: &ObjectId) -> IndexResult<Option<Index>> {
        let Some(info) = self.db.get_index_info(tree_name, attribute_name)? else {
            return Ok(None);
        };
        Ok(self
            .db
            .resolve_indexed_tree(&info.id(), canonical)?
            .map(|indexed| Index::new(info, indexed)))
    }

    /// Remove an index definition and its mappings. Index trees stay in
    /// the object store. Returns `false` if no such index exists.
    pub fn drop_index(&self, tree_name: &str, attribute_name: &str) -> IndexResult<bool> {
        let dropped = self
            .db
            .drop_index_info(&IndexInfo::id_for(tree_name, attribute_name))?;
        if dropped {
            info!(tree = tree_name, attribute = attribute_name, "index dropped");
        }
        Ok(dropped)
    }

    /// Index nodes of an attribute index whose value equals `value`.
    ///
    /// Reads one tree node per level along the value's hash path.
    pub fn lookup_value(&self, index: &Index, value: &FieldValue) -> IndexResult<Vec<Node>> {
        if index.info.index_type != IndexType::Attribute {
            return Err(IndexError::Validation(format!(
                "{} does not support value lookups",
                index.info
            )));
        }
        let partitioner = self.attribute_partitioner(&index.info);
        let key = value_key(value);
        let attribute = &index.info.attribute_name;

        let mut found = Vec::new();
        let mut tree = load_tree(self.store, &index.indexed_tree_id)?;
        let mut depth = 0;
        loop {
            found.extend(
                tree.entries
                    .iter()
                    .filter(|n| n.extra_data.get(attribute) == Some(value))
                    .cloned(),
            );
            let next = partitioner
                .bucket_of(&key, depth)
                .and_then(|i| tree.bucket(i))
                .map(|b| b.tree_id);
            match next {
                Some(id) => {
                    tree = load_tree(self.store, &id)?;
                    depth += 1;
                }
                None => break,
            }
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::IndexDatabase;
    use crate::fixtures::*;
    use geovc_store::{AttributeDescriptor, ObjectStore, RevFeatureType, RevObject};
    use geovc_refs::RefStore;
    use geovc_types::Envelope;
    use std::sync::Barrier;

    fn quad_request(fx: &Fixture, canonical: ObjectId) -> CreateIndexRequest {
        CreateIndexRequest::new()
            .tree_name(TREE)
            .attribute_name("geom")
            .index_type(IndexType::QuadTree)
            .canonical_tree(canonical)
            .feature_type_id(fx.feature_type)
    }

    // ---------------------------------------------------------------
    // Definitions
    // ---------------------------------------------------------------

    #[test]
    fn create_index_info_rejects_empty_names() {
        let fx = Fixture::new();
        let engine = fx.engine();
        for info in [
            IndexInfo::new("", "geom", IndexType::QuadTree),
            IndexInfo::new(TREE, " ", IndexType::QuadTree),
        ] {
            assert!(matches!(
                engine.create_index_info(info),
                Err(IndexError::Validation(_))
            ));
        }
        assert!(fx.db.is_empty());
    }

    #[test]
    fn missing_request_fields_fail_before_store_access() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let missing_type = CreateIndexRequest::new()
            .tree_name(TREE)
            .attribute_name("geom")
            .canonical_tree(RevTree::empty_id())
            .feature_type_id(fx.feature_type);
        assert!(matches!(
            engine.create_index(missing_type),
            Err(IndexError::Validation(_))
        ));
        let null_type = quad_request(&fx, RevTree::empty_id()).feature_type_id(ObjectId::NULL);
        assert!(matches!(
            engine.create_index(null_type),
            Err(IndexError::Validation(_))
        ));
        let no_tree = CreateIndexRequest {
            canonical_tree: None,
            ..quad_request(&fx, RevTree::empty_id())
        };
        assert!(matches!(
            engine.create_index(no_tree),
            Err(IndexError::Validation(_))
        ));
        assert!(fx.db.is_empty());
    }

    // ---------------------------------------------------------------
    // Creation
    // ---------------------------------------------------------------

    #[test]
    fn empty_tree_creates_retrievable_definition() {
        let fx = Fixture::new();
        let index = fx
            .engine()
            .create_index(quad_request(&fx, RevTree::empty_id()))
            .unwrap();
        assert_eq!(index.indexed_tree_id, RevTree::empty_id());
        assert!(index.is_empty());
        let stored = fx.db.get_index_info(TREE, "geom").unwrap().unwrap();
        assert_eq!(stored, index.info);
        assert_eq!(stored.bounds(), Some(Envelope::WORLD));
    }

    #[test]
    fn explicit_bounds_skip_crs_resolution() {
        let fx = Fixture::new();
        let canonical = fx.canonical(&fx.grid(50));
        let index = fx
            .engine()
            .create_index(quad_request(&fx, canonical).metadata(BOUNDS_KEY, fx.bounds))
            .unwrap();
        assert_eq!(index.info.bounds(), Some(fx.bounds));
        assert_eq!(index.size(&fx.store).unwrap(), 50);
        let hits = index
            .query(&fx.store, &Envelope::new(0.0, 0.0, 3.0, 3.0))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "g0000");
    }

    #[test]
    fn unknown_crs_is_a_resolution_error() {
        let fx = Fixture::new();
        let feature_type = RevFeatureType::new(
            "local",
            vec![AttributeDescriptor::geometry("geom", "LOCAL:1")],
        );
        let id = feature_type.id();
        fx.store.put(&RevObject::from(feature_type)).unwrap();
        let err = fx
            .engine()
            .create_index(quad_request(&fx, RevTree::empty_id()).feature_type_id(id))
            .unwrap_err();
        assert!(matches!(err, IndexError::ReferenceResolution { crs, .. } if crs == "LOCAL:1"));
        assert!(fx.db.is_empty());
    }

    #[test]
    fn concurrent_identical_creates_both_succeed() {
        let fx = Fixture::new();
        let barrier = Barrier::new(2);
        let results: Vec<IndexResult<Index>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        fx.engine().create_index(quad_request(&fx, RevTree::empty_id()))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for result in results {
            assert_eq!(result.unwrap().indexed_tree_id, RevTree::empty_id());
        }
        assert_eq!(fx.db.len(), 1);
        assert_eq!(fx.db.index_infos(TREE).unwrap().len(), 1);
    }

    #[test]
    fn create_with_history_indexes_branch_head() {
        let fx = Fixture::new();
        let all = fx.grid(30);
        let c1 = fx.commit(&all[..12], &[], 1);
        let c2 = fx.commit(&all, &[c1], 2);
        fx.refs.update_branch("main", None, c2).unwrap();

        let head_tree = fx.canonical(&all);
        let index = fx
            .engine()
            .create_index(
                quad_request(&fx, head_tree)
                    .metadata(BOUNDS_KEY, fx.bounds)
                    .index_history("main"),
            )
            .unwrap();
        assert_eq!(index.size(&fx.store).unwrap(), 30);
        assert_eq!(fx.db.indexed_trees(&index.info.id()).unwrap().len(), 2);
        assert_eq!(
            fx.engine().index_for(TREE, "geom", &head_tree).unwrap(),
            Some(index)
        );
    }

    #[test]
    fn history_request_checks_head_tree() {
        let fx = Fixture::new();
        let all = fx.grid(20);
        let c1 = fx.commit(&all[..8], &[], 1);
        let c2 = fx.commit(&all, &[c1], 2);
        fx.refs.update_branch("main", None, c2).unwrap();
        let old_tree = fx.canonical(&all[..8]);
        let head_tree = fx.canonical(&all);

        let stale = quad_request(&fx, old_tree)
            .metadata(BOUNDS_KEY, fx.bounds)
            .index_history("main");
        assert!(matches!(
            fx.engine().create_index(stale),
            Err(IndexError::State(_))
        ));
        assert!(fx.db.is_empty());

        let without_tree = CreateIndexRequest {
            canonical_tree: None,
            ..quad_request(&fx, head_tree)
                .metadata(BOUNDS_KEY, fx.bounds)
                .index_history("main")
        };
        let index = fx.engine().create_index(without_tree).unwrap();
        assert_eq!(index.size(&fx.store).unwrap(), 20);
        assert_eq!(
            fx.engine().index_for(TREE, "geom", &head_tree).unwrap(),
            Some(index)
        );
    }

    // ---------------------------------------------------------------
    // Update, drop and lookups
    // ---------------------------------------------------------------

    #[test]
    fn update_and_drop() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let before = fx.grid(20);
        let old = fx.canonical(&before);
        let created = engine
            .create_index(quad_request(&fx, old).metadata(BOUNDS_KEY, fx.bounds))
            .unwrap();

        let new = fx.canonical(&before[5..]);
        let updated = engine
            .update_index(TREE, "geom", &old, &new, &fx.feature_type)
            .unwrap();
        assert_eq!(updated.info, created.info);
        assert_eq!(updated.size(&fx.store).unwrap(), 15);

        assert!(engine.drop_index(TREE, "geom").unwrap());
        assert!(!engine.drop_index(TREE, "geom").unwrap());
        assert!(engine.index_for(TREE, "geom", &old).unwrap().is_none());
        assert!(matches!(
            engine.update_index(TREE, "geom", &old, &new, &fx.feature_type),
            Err(IndexError::NotFound(_))
        ));
    }

    #[test]
    fn lookup_by_value_follows_hash_path() {
        let fx = Fixture::new();
        let canonical = fx.canonical(&fx.grid(100));
        let engine = fx.engine();
        let index = engine
            .create_index(
                CreateIndexRequest::new()
                    .tree_name(TREE)
                    .attribute_name("name")
                    .index_type(IndexType::Attribute)
                    .canonical_tree(canonical)
                    .feature_type_id(fx.feature_type),
            )
            .unwrap();
        let hits = engine.lookup_value(&index, &"n3".into()).unwrap();
        assert_eq!(hits.len(), 20);
        assert!(hits
            .iter()
            .all(|n| n.extra_data.get("name") == Some(&FieldValue::from("n3"))));
        assert!(engine.lookup_value(&index, &"zzz".into()).unwrap().is_empty());

        let quad = engine
            .create_index(quad_request(&fx, canonical).metadata(BOUNDS_KEY, fx.bounds))
            .unwrap();
        assert!(matches!(
            engine.lookup_value(&quad, &"n3".into()),
            Err(IndexError::Validation(_))
        ));
    }
}
