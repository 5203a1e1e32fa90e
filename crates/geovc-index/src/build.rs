//! Building secondary index trees from canonical trees.
//!
//! An index tree holds one node per indexed feature, named like the
//! feature's canonical entry and routed by an index partitioner instead of
//! by name. Builds are driven by the canonical diff: from the empty tree for
//! a first build, or from a previously indexed canonical tree so that only
//! changed features are touched. Both paths produce the same tree id.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use geovc_dag::CommitGraph;
use geovc_refs::RefStore;
use geovc_store::{Node, NodeKind, ObjectStore, RevFeatureType, RevTree, StoreError};
use geovc_tree::{Edit, Partitioner, TreeConfig, TreeOps, TrieEngine, BUCKETS_PER_LEVEL, MAX_LEAF_ENTRIES};
use geovc_types::{AttributeType, FieldValue, ObjectId};

use crate::attribute::{AttributePartitioner, DEFAULT_ATTRIBUTE_MAX_DEPTH};
use crate::bounds::CrsBoundsProvider;
use crate::database::IndexDatabase;
use crate::error::{IndexError, IndexResult};
use crate::info::{IndexInfo, IndexType, BOUNDS_KEY};
use crate::quadtree::{QuadTreePartitioner, DEFAULT_QUAD_MAX_DEPTH};

/// Index edits applied per trie rebuild during a build.
const EDIT_BATCH: usize = 4096;

/// Shape parameters of index trees.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Deepest quadtree level, unless an index sets `@maxDepth`.
    pub quad_max_depth: usize,
    /// Deepest attribute index level, unless an index sets `@maxDepth`.
    pub attribute_max_depth: usize,
    pub max_leaf_entries: usize,
    /// Fan-out of attribute index nodes. Quadtree nodes always have four.
    pub buckets_per_level: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            quad_max_depth: DEFAULT_QUAD_MAX_DEPTH,
            attribute_max_depth: DEFAULT_ATTRIBUTE_MAX_DEPTH,
            max_leaf_entries: MAX_LEAF_ENTRIES,
            buckets_per_level: BUCKETS_PER_LEVEL,
        }
    }
}

/// Outcome of indexing the history of a branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryReport {
    /// Commits visited.
    pub commits: usize,
    /// Index trees built.
    pub built: usize,
    /// Commits whose canonical tree was already indexed.
    pub reused: usize,
    /// Commits without an indexable tree at the index's path.
    pub skipped: usize,
    /// Index tree of the branch head.
    pub head_indexed_tree: ObjectId,
}

/// Index operations over one repository's stores.
pub struct IndexEngine<'a> {
    pub(crate) store: &'a dyn ObjectStore,
    pub(crate) db: &'a dyn IndexDatabase,
    pub(crate) bounds: &'a dyn CrsBoundsProvider,
    pub(crate) refs: &'a dyn RefStore,
    pub(crate) tree_config: TreeConfig,
    pub(crate) config: IndexConfig,
}

impl<'a> IndexEngine<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        db: &'a dyn IndexDatabase,
        bounds: &'a dyn CrsBoundsProvider,
        refs: &'a dyn RefStore,
    ) -> Self {
        Self {
            store,
            db,
            bounds,
            refs,
            tree_config: TreeConfig::default(),
            config: IndexConfig::default(),
        }
    }

    /// Use `config` to read canonical trees. Must match the configuration
    /// the trees were written with.
    pub fn with_tree_config(mut self, config: TreeConfig) -> Self {
        self.tree_config = config;
        self
    }

    pub fn with_config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub(crate) fn tree_ops(&self) -> TreeOps<'a> {
        TreeOps::with_config(self.store, self.tree_config)
    }

    pub(crate) fn quad_partitioner(&self, info: &IndexInfo) -> IndexResult<QuadTreePartitioner> {
        let bounds = info.bounds().ok_or_else(|| {
            IndexError::Validation(format!("{info} has no {BOUNDS_KEY} metadata"))
        })?;
        if !bounds.is_valid() {
            return Err(IndexError::Validation(format!(
                "{info} has invalid bounds {bounds:?}"
            )));
        }
        Ok(QuadTreePartitioner::new(
            bounds,
            info.max_depth().unwrap_or(self.config.quad_max_depth),
            self.config.max_leaf_entries,
        ))
    }

    pub(crate) fn attribute_partitioner(&self, info: &IndexInfo) -> AttributePartitioner {
        AttributePartitioner::new(
            info.attribute_name.clone(),
            info.max_depth().unwrap_or(self.config.attribute_max_depth),
            self.config.max_leaf_entries,
            self.config.buckets_per_level,
        )
    }

    // ---------------------------------------------------------------
    // Single tree
    // ---------------------------------------------------------------

    /// Index the canonical tree `new_canonical` and return its index tree.
    ///
    /// An existing mapping for `new_canonical` is returned as is. If
    /// `old_canonical` is already indexed, only the changes between the two
    /// canonical trees are applied to its index tree; otherwise every
    /// feature of `new_canonical` is indexed. `feature_type_id` describes
    /// features whose node carries no feature type of its own.
    pub fn build_index(
        &self,
        info: &IndexInfo,
        old_canonical: &ObjectId,
        new_canonical: &ObjectId,
        feature_type_id: &ObjectId,
    ) -> IndexResult<ObjectId> {
        let info_id = info.id();
        if let Some(existing) = self.db.resolve_indexed_tree(&info_id, new_canonical)? {
            debug!(
                index = %info,
                canonical = %new_canonical.short_hex(),
                "index tree already built"
            );
            return Ok(existing);
        }

        let indexed = match info.index_type {
            IndexType::QuadTree => {
                let p = self.quad_partitioner(info)?;
                self.build_with(&p, info, old_canonical, new_canonical, feature_type_id)?
            }
            IndexType::Attribute => {
                let p = self.attribute_partitioner(info);
                self.build_with(&p, info, old_canonical, new_canonical, feature_type_id)?
            }
        };
        self.db.add_indexed_tree(&info_id, new_canonical, &indexed)?;
        Ok(indexed)
    }

    fn build_with<P: Partitioner>(
        &self,
        partitioner: &P,
        info: &IndexInfo,
        old_canonical: &ObjectId,
        new_canonical: &ObjectId,
        feature_type_id: &ObjectId,
    ) -> IndexResult<ObjectId> {
        let mut materializer = Materializer::new(self.store, info, *feature_type_id)?;
        let empty = RevTree::empty_id();
        let (mut root, base) = match self.db.resolve_indexed_tree(&info.id(), old_canonical)? {
            Some(indexed) => (indexed, *old_canonical),
            None => (empty, empty),
        };

        let engine = TrieEngine::new(self.store, partitioner);
        let mut edits = Vec::new();
        let mut changes = 0usize;
        for change in self.tree_ops().diff(&base, new_canonical) {
            let change = change?;
            changes += 1;
            if let Some(old) = change.old() {
                if let Some(node) = materializer.index_node(old)? {
                    edits.push(Edit::Remove(partitioner.key_of(&node), node.name));
                }
            }
            if let Some(new) = change.new_node() {
                if let Some(node) = materializer.index_node(new)? {
                    edits.push(Edit::Put(partitioner.key_of(&node), node));
                }
            }
            if edits.len() >= EDIT_BATCH {
                root = engine.apply(&root, std::mem::take(&mut edits))?;
            }
        }
        root = engine.apply(&root, edits)?;

        info!(
            index = %info,
            canonical = %new_canonical.short_hex(),
            indexed = %root.short_hex(),
            incremental = base != empty,
            changes,
            "index tree built"
        );
        Ok(root)
    }

    // ---------------------------------------------------------------
    // History
    // ---------------------------------------------------------------

    /// Index the tree at `info.tree_name` in every commit of `branch`,
    /// oldest first.
    ///
    /// Each commit is indexed incrementally from its first parent. Fails
    /// with [`IndexError::State`] if the head commit ends up without an
    /// index tree.
    pub fn build_full_history_index(&self, info: &IndexInfo, branch: &str) -> IndexResult<HistoryReport> {
        let head = self.refs.resolve(branch)?;
        let graph = CommitGraph::load(self.store, [head])?;
        let ops = self.tree_ops();
        let info_id = info.id();

        let mut canonical_of: HashMap<ObjectId, ObjectId> = HashMap::new();
        let mut report = HistoryReport {
            commits: 0,
            built: 0,
            reused: 0,
            skipped: 0,
            head_indexed_tree: ObjectId::NULL,
        };
        for commit in graph.history(&head)? {
            report.commits += 1;
            let node = match ops.resolve_path(&commit.tree_id, &info.tree_name)? {
                Some(node) if node.kind == NodeKind::Tree => node,
                _ => {
                    report.skipped += 1;
                    continue;
                }
            };
            let canonical = node.object_id;
            canonical_of.insert(commit.id, canonical);
            if self.db.resolve_indexed_tree(&info_id, &canonical)?.is_some() {
                report.reused += 1;
                continue;
            }
            let Some(feature_type) = node.metadata_id else {
                warn!(
                    index = %info,
                    commit = %commit.id.short_hex(),
                    "tree has no feature type, commit skipped"
                );
                report.skipped += 1;
                continue;
            };
            let old = commit
                .first_parent()
                .and_then(|p| canonical_of.get(p))
                .copied()
                .unwrap_or_else(RevTree::empty_id);
            self.build_index(info, &old, &canonical, &feature_type)?;
            report.built += 1;
        }

        let head_indexed = match canonical_of.get(&head) {
            Some(canonical) => self.db.resolve_indexed_tree(&info_id, canonical)?,
            None => None,
        };
        report.head_indexed_tree = head_indexed.ok_or_else(|| {
            IndexError::State(format!(
                "{info}: head {} of {branch} has no index tree",
                head.short_hex()
            ))
        })?;
        info!(
            index = %info,
            branch,
            commits = report.commits,
            built = report.built,
            reused = report.reused,
            skipped = report.skipped,
            "history indexed"
        );
        Ok(report)
    }
}

/// Load a feature type, reporting a missing one as [`IndexError::NotFound`].
pub(crate) fn load_feature_type(store: &dyn ObjectStore, id: &ObjectId) -> IndexResult<RevFeatureType> {
    store.get_feature_type(id).map_err(|e| match e {
        StoreError::NotFound(_) => IndexError::NotFound(*id),
        other => IndexError::Store(other),
    })
}

/// Attribute positions an index reads from features of one type.
#[derive(Clone, Debug)]
struct Layout {
    position: usize,
    // The indexed attribute is the default geometry, whose envelope the
    // canonical node already carries as its extent.
    extent_from_node: bool,
    extras: Vec<(String, usize)>,
}

impl Layout {
    fn resolve(info: &IndexInfo, feature_type: &RevFeatureType) -> IndexResult<Self> {
        let (position, descriptor) = feature_type
            .attribute(&info.attribute_name)
            .ok_or_else(|| {
                IndexError::Validation(format!(
                    "feature type {} has no attribute {}",
                    feature_type.name, info.attribute_name
                ))
            })?;
        if info.index_type == IndexType::QuadTree && descriptor.binding != AttributeType::Geometry {
            return Err(IndexError::Validation(format!(
                "{info}: attribute is a {}, not a geometry",
                descriptor.binding
            )));
        }
        let extras = info
            .materialized_attributes()
            .iter()
            .map(|name| {
                feature_type
                    .attribute(name)
                    .map(|(i, _)| (name.clone(), i))
                    .ok_or_else(|| {
                        IndexError::Validation(format!(
                            "feature type {} has no attribute {name} to materialize",
                            feature_type.name
                        ))
                    })
            })
            .collect::<IndexResult<Vec<_>>>()?;
        let extent_from_node = feature_type
            .default_geometry()
            .is_some_and(|(default, _)| default == position);
        Ok(Self {
            position,
            extent_from_node,
            extras,
        })
    }
}

/// Derives index nodes from canonical feature nodes.
struct Materializer<'a> {
    store: &'a dyn ObjectStore,
    info: &'a IndexInfo,
    default_type: ObjectId,
    layouts: HashMap<ObjectId, Layout>,
}

impl<'a> Materializer<'a> {
    fn new(store: &'a dyn ObjectStore, info: &'a IndexInfo, default_type: ObjectId) -> IndexResult<Self> {
        let mut materializer = Self {
            store,
            info,
            default_type,
            layouts: HashMap::new(),
        };
        materializer.layout(&default_type)?;
        Ok(materializer)
    }

    fn layout(&mut self, type_id: &ObjectId) -> IndexResult<Layout> {
        match self.layouts.entry(*type_id) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(e) => {
                let feature_type = load_feature_type(self.store, type_id)?;
                Ok(e.insert(Layout::resolve(self.info, &feature_type)?).clone())
            }
        }
    }

    /// The index node of `node`, or `None` if the feature is not indexed.
    fn index_node(&mut self, node: &Node) -> IndexResult<Option<Node>> {
        if !node.is_feature() {
            return Ok(None);
        }
        let layout = self.layout(&node.metadata_id.unwrap_or(self.default_type))?;
        let node_extent = node.extent.filter(|_| layout.extent_from_node);
        let needs_feature = self.info.index_type == IndexType::Attribute
            || node_extent.is_none()
            || !layout.extras.is_empty();
        let feature = if needs_feature {
            Some(self.store.get_feature(&node.object_id)?)
        } else {
            None
        };
        let value = |i: usize| feature.as_ref().and_then(|f| f.get(i));

        let mut out = Node::feature(node.name.clone(), node.object_id);
        out.metadata_id = node.metadata_id;
        match self.info.index_type {
            IndexType::QuadTree => {
                let extent =
                    node_extent.or_else(|| value(layout.position).and_then(FieldValue::envelope));
                match extent {
                    Some(extent) => out.extent = Some(extent),
                    None => return Ok(None),
                }
            }
            IndexType::Attribute => match value(layout.position) {
                Some(v) if !v.is_null() => {
                    out.extra_data
                        .insert(self.info.attribute_name.clone(), v.clone());
                    out.extent = node.extent;
                }
                _ => return Ok(None),
            },
        }
        for (name, i) in &layout.extras {
            if let Some(v) = value(*i).filter(|v| !v.is_null()) {
                out.extra_data.insert(name.clone(), v.clone());
            }
        }
        Ok(Some(out))
    }
}
