//! Shared test fixture: a repository of point features.

use geo_types::{Geometry, Point};

use geovc_refs::InMemoryRefStore;
use geovc_store::{
    AttributeDescriptor, InMemoryObjectStore, Node, ObjectStore, RevCommit, RevFeature,
    RevFeatureType, RevObject, RevTree,
};
use geovc_tree::{TreeConfig, TreeOps};
use geovc_types::{AttributeType, Envelope, FieldValue, ObjectId, Person};

use crate::bounds::StaticBoundsProvider;
use crate::build::{IndexConfig, IndexEngine};
use crate::database::{IndexDatabase, InMemoryIndexDatabase};
use crate::error::IndexResult;
use crate::info::{IndexInfo, IndexType, BOUNDS_KEY};

pub(crate) const TREE: &str = "points";

pub(crate) struct Fixture {
    pub store: InMemoryObjectStore,
    pub db: InMemoryIndexDatabase,
    pub bounds_provider: StaticBoundsProvider,
    pub refs: InMemoryRefStore,
    pub tree_config: TreeConfig,
    pub index_config: IndexConfig,
    pub feature_type: ObjectId,
    pub bounds: Envelope,
}

impl Fixture {
    pub fn new() -> Self {
        let store = InMemoryObjectStore::new();
        let feature_type = RevFeatureType::new(
            "point",
            vec![
                AttributeDescriptor::geometry("geom", "EPSG:4326"),
                AttributeDescriptor::new("name", AttributeType::String),
            ],
        );
        let feature_type_id = feature_type.id();
        store.put(&RevObject::from(feature_type)).unwrap();
        Self {
            store,
            db: InMemoryIndexDatabase::new(),
            bounds_provider: StaticBoundsProvider::default(),
            refs: InMemoryRefStore::new(),
            tree_config: TreeConfig {
                max_leaf_entries: 8,
                buckets_per_level: 4,
                max_depth: 12,
            },
            index_config: IndexConfig {
                quad_max_depth: 12,
                attribute_max_depth: 8,
                max_leaf_entries: 8,
                buckets_per_level: 4,
            },
            feature_type: feature_type_id,
            bounds: Envelope::new(0.0, 0.0, 100.0, 100.0),
        }
    }

    pub fn engine(&self) -> IndexEngine<'_> {
        IndexEngine::new(&self.store, &self.db, &self.bounds_provider, &self.refs)
            .with_tree_config(self.tree_config)
            .with_config(self.index_config)
    }

    pub fn quad_info(&self) -> IndexInfo {
        IndexInfo::new(TREE, "geom", IndexType::QuadTree).with_metadata(BOUNDS_KEY, self.bounds)
    }

    /// Define `info` and index `new` from `old` with the fixture's type.
    pub fn build(&self, info: &IndexInfo, old: &ObjectId, new: &ObjectId) -> IndexResult<ObjectId> {
        self.db.create_index_info(info.clone())?;
        self.engine()
            .build_index(info, old, new, &self.feature_type)
    }

    pub fn feature(&self, name: &str, geom: FieldValue, label: FieldValue) -> Node {
        let feature = RevFeature::new(vec![geom, label]);
        let feature_type = self.store.get_feature_type(&self.feature_type).unwrap();
        let mut node = Node::feature(name, feature.id()).with_metadata_id(self.feature_type);
        node.extent = feature.default_bounds(&feature_type);
        self.store.put(&RevObject::from(feature)).unwrap();
        node
    }

    pub fn point_feature(&self, name: &str, x: f64, y: f64, label: &str) -> Node {
        let point: Geometry<f64> = Point::new(x, y).into();
        self.feature(name, point.into(), label.into())
    }

    pub fn feature_without_geometry(&self, name: &str, label: &str) -> Node {
        self.feature(name, FieldValue::Null, label.into())
    }

    pub fn feature_with_null_name(&self, name: &str, x: f64, y: f64) -> Node {
        let point: Geometry<f64> = Point::new(x, y).into();
        self.feature(name, point.into(), FieldValue::Null)
    }

    /// `n` points on a 5-unit grid inside the fixture bounds.
    pub fn grid(&self, n: usize) -> Vec<Node> {
        (0..n)
            .map(|i| {
                let x = (i % 20) as f64 * 5.0 + 1.0;
                let y = ((i / 20) % 20) as f64 * 5.0 + 1.0;
                self.point_feature(&format!("g{i:04}"), x, y, &format!("n{}", i % 5))
            })
            .collect()
    }

    pub fn ops(&self) -> TreeOps<'_> {
        TreeOps::with_config(&self.store, self.tree_config)
    }

    pub fn canonical(&self, nodes: &[Node]) -> ObjectId {
        let mut builder = self.ops().builder(RevTree::empty_id());
        for node in nodes {
            builder.put(node.clone());
        }
        builder.build().unwrap()
    }

    pub fn commit_root(&self, root: ObjectId, parents: &[ObjectId], timestamp: i64) -> ObjectId {
        let person = Person::new(Some("tester".into()), Some("tester@example.com".into()), timestamp, 0);
        let commit = RevCommit {
            tree_id: root,
            parent_ids: parents.to_vec(),
            author: person.clone(),
            committer: person,
            message: format!("commit at {timestamp}"),
        };
        let id = commit.id();
        self.store.put(&RevObject::from(commit)).unwrap();
        id
    }

    /// Commit a root tree holding `nodes` under [`TREE`].
    pub fn commit(&self, nodes: &[Node], parents: &[ObjectId], timestamp: i64) -> ObjectId {
        let canonical = self.canonical(nodes);
        let root = self
            .ops()
            .update_path(&RevTree::empty_id(), TREE, &canonical, Some(self.feature_type))
            .unwrap();
        self.commit_root(root, parents, timestamp)
    }
}
