use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use geovc_crypto::ContentHasher;
use geovc_types::{AttributeType, Envelope, FieldValue, ObjectId, Person};

use crate::codec::{self, Decoder, Encoder};
use crate::error::{StoreError, StoreResult};

/// The kind of revision object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Snapshot of a repository: root tree plus ancestry.
    Commit,
    /// Hash-trie node holding entries and/or buckets.
    Tree,
    /// Attribute values of a single feature.
    Feature,
    /// Schema of a feature collection.
    FeatureType,
    /// Named, annotated pointer to a commit.
    Tag,
}

impl ObjectKind {
    /// Wire tag used in loose-object files.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Feature => 3,
            Self::FeatureType => 4,
            Self::Tag => 5,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Commit),
            2 => Some(Self::Tree),
            3 => Some(Self::Feature),
            4 => Some(Self::FeatureType),
            5 => Some(Self::Tag),
            _ => None,
        }
    }

    /// The domain-separated hasher for this kind.
    pub fn hasher(&self) -> &'static ContentHasher {
        match self {
            Self::Commit => &ContentHasher::COMMIT,
            Self::Tree => &ContentHasher::TREE,
            Self::Feature => &ContentHasher::FEATURE,
            Self::FeatureType => &ContentHasher::FEATURE_TYPE,
            Self::Tag => &ContentHasher::TAG,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Commit => write!(f, "commit"),
            Self::Tree => write!(f, "tree"),
            Self::Feature => write!(f, "feature"),
            Self::FeatureType => write!(f, "featuretype"),
            Self::Tag => write!(f, "tag"),
        }
    }
}

/// A stored object: kind tag + canonical encoding + cached size.
///
/// `StoredObject` is the unit of storage. Backends never interpret the
/// data; they key it by [`StoredObject::compute_id`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// The type of this object.
    pub kind: ObjectKind,
    /// The canonical encoding of the object.
    pub data: Vec<u8>,
    /// The size of `data` in bytes.
    pub size: u64,
}

impl StoredObject {
    /// Create a new stored object from kind and data.
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// Compute the content-addressed ID for this object.
    pub fn compute_id(&self) -> ObjectId {
        self.kind.hasher().hash(&self.data)
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// What a tree [`Node`] points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Feature,
    Tree,
}

impl NodeKind {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Self::Feature => 1,
            Self::Tree => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Feature),
            2 => Some(Self::Tree),
            _ => None,
        }
    }
}

/// A named entry inside a tree, referencing a feature or a nested tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Entry name, unique within its tree.
    pub name: String,
    /// Id of the referenced feature or tree.
    pub object_id: ObjectId,
    pub kind: NodeKind,
    /// Feature type of the referenced feature, or of the features in the
    /// referenced tree.
    pub metadata_id: Option<ObjectId>,
    /// Precomputed bounding extent of the referenced object.
    pub extent: Option<Envelope>,
    /// Attribute values materialized into the node (used by index trees).
    pub extra_data: BTreeMap<String, FieldValue>,
}

impl Node {
    /// A node pointing at a feature.
    pub fn feature(name: impl Into<String>, object_id: ObjectId) -> Self {
        Self::new(name, object_id, NodeKind::Feature)
    }

    /// A node pointing at a nested tree.
    pub fn tree(name: impl Into<String>, object_id: ObjectId) -> Self {
        Self::new(name, object_id, NodeKind::Tree)
    }

    pub fn new(name: impl Into<String>, object_id: ObjectId, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            object_id,
            kind,
            metadata_id: None,
            extent: None,
            extra_data: BTreeMap::new(),
        }
    }

    pub fn with_metadata_id(mut self, metadata_id: ObjectId) -> Self {
        self.metadata_id = Some(metadata_id);
        self
    }

    pub fn with_extent(mut self, extent: Envelope) -> Self {
        self.extent = Some(extent);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.extra_data.insert(key.into(), value);
        self
    }

    pub fn is_feature(&self) -> bool {
        self.kind == NodeKind::Feature
    }
}

/// Fan-out slot of a tree, holding the id of a nested tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    /// Position of the bucket at its tree level.
    pub index: u32,
    /// Id of the tree holding this bucket's entries.
    pub tree_id: ObjectId,
    /// Union of the extents of everything below this bucket.
    pub bounds: Option<Envelope>,
}

impl Bucket {
    pub fn new(index: u32, tree_id: ObjectId, bounds: Option<Envelope>) -> Self {
        Self {
            index,
            tree_id,
            bounds,
        }
    }
}

/// Hash-trie node of a feature collection snapshot.
///
/// A tree holds direct entries sorted by name and, once large enough,
/// buckets sorted by index. `size` counts every entry reachable from this
/// node, so parents can decide whether to split or collapse without loading
/// their children.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevTree {
    pub size: u64,
    pub entries: Vec<Node>,
    pub buckets: Vec<Bucket>,
}

impl RevTree {
    /// Create a leaf tree from entries. Entries are sorted by name.
    pub fn leaf(entries: Vec<Node>) -> Self {
        let size = entries.len() as u64;
        Self::new(entries, Vec::new(), size)
    }

    /// Create a tree; entries are sorted by name and buckets by index for
    /// deterministic hashing.
    pub fn new(mut entries: Vec<Node>, mut buckets: Vec<Bucket>, size: u64) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        buckets.sort_by_key(|b| b.index);
        Self {
            size,
            entries,
            buckets,
        }
    }

    /// The empty tree.
    pub fn empty() -> Self {
        Self {
            size: 0,
            entries: Vec::new(),
            buckets: Vec::new(),
        }
    }

    /// Id of the empty tree. Constant for a given format version.
    pub fn empty_id() -> ObjectId {
        static EMPTY: OnceLock<ObjectId> = OnceLock::new();
        *EMPTY.get_or_init(|| RevTree::empty().id())
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0 && self.entries.is_empty() && self.buckets.is_empty()
    }

    /// `true` if this tree has no buckets.
    pub fn is_leaf(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Look up a direct entry by name.
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.entries
            .binary_search_by(|n| n.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Look up a bucket by index.
    pub fn bucket(&self, index: u32) -> Option<&Bucket> {
        self.buckets
            .binary_search_by_key(&index, |b| b.index)
            .ok()
            .map(|i| &self.buckets[i])
    }

    /// Union of the extents of all direct entries and buckets.
    pub fn bounds(&self) -> Option<Envelope> {
        Envelope::union_all(
            self.entries
                .iter()
                .map(|n| n.extent.as_ref())
                .chain(self.buckets.iter().map(|b| b.bounds.as_ref())),
        )
    }

    pub fn id(&self) -> ObjectId {
        self.to_stored_object().compute_id()
    }

    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> StoredObject {
        let mut enc = Encoder::new();
        codec::encode_tree(&mut enc, self);
        StoredObject::new(ObjectKind::Tree, enc.finish())
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        expect_kind(obj, ObjectKind::Tree)?;
        decode_body(obj, codec::decode_tree)
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// A snapshot of the repository: a root tree and its ancestry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevCommit {
    pub tree_id: ObjectId,
    /// Parents in order; the first parent is the mainline.
    pub parent_ids: Vec<ObjectId>,
    pub author: Person,
    pub committer: Person,
    pub message: String,
}

impl RevCommit {
    /// Commit timestamp (the committer's), epoch milliseconds.
    pub fn timestamp(&self) -> i64 {
        self.committer.timestamp
    }

    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parent_ids.first()
    }

    pub fn id(&self) -> ObjectId {
        self.to_stored_object().compute_id()
    }

    pub fn to_stored_object(&self) -> StoredObject {
        let mut enc = Encoder::new();
        codec::encode_commit(&mut enc, self);
        StoredObject::new(ObjectKind::Commit, enc.finish())
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        expect_kind(obj, ObjectKind::Commit)?;
        decode_body(obj, codec::decode_commit)
    }
}

// ---------------------------------------------------------------------------
// Feature
// ---------------------------------------------------------------------------

/// Attribute values of one feature, in feature type order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevFeature {
    pub values: Vec<FieldValue>,
}

impl RevFeature {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index)
    }

    /// Union of the envelopes of all geometry values.
    pub fn bounds(&self) -> Option<Envelope> {
        let envelopes: Vec<Envelope> = self.values.iter().filter_map(|v| v.envelope()).collect();
        Envelope::union_all(envelopes.iter().map(Some))
    }

    /// Envelope of the value in the default geometry slot of `feature_type`.
    pub fn default_bounds(&self, feature_type: &RevFeatureType) -> Option<Envelope> {
        let (position, _) = feature_type.default_geometry()?;
        self.get(position).and_then(FieldValue::envelope)
    }

    pub fn id(&self) -> ObjectId {
        self.to_stored_object().compute_id()
    }

    pub fn to_stored_object(&self) -> StoredObject {
        let mut enc = Encoder::new();
        codec::encode_feature(&mut enc, self);
        StoredObject::new(ObjectKind::Feature, enc.finish())
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        expect_kind(obj, ObjectKind::Feature)?;
        decode_body(obj, codec::decode_feature)
    }
}

// ---------------------------------------------------------------------------
// FeatureType
// ---------------------------------------------------------------------------

/// Describes one attribute of a feature type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub binding: AttributeType,
    pub nillable: bool,
    /// Coordinate reference system identifier (e.g. `"EPSG:4326"`) for
    /// geometry attributes.
    pub crs: Option<String>,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>, binding: AttributeType) -> Self {
        Self {
            name: name.into(),
            binding,
            nillable: true,
            crs: None,
        }
    }

    /// A nillable geometry attribute in the given CRS.
    pub fn geometry(name: impl Into<String>, crs: impl Into<String>) -> Self {
        Self {
            crs: Some(crs.into()),
            ..Self::new(name, AttributeType::Geometry)
        }
    }
}

/// Schema of a feature collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevFeatureType {
    pub name: String,
    pub descriptors: Vec<AttributeDescriptor>,
}

impl RevFeatureType {
    pub fn new(name: impl Into<String>, descriptors: Vec<AttributeDescriptor>) -> Self {
        Self {
            name: name.into(),
            descriptors,
        }
    }

    /// Position and descriptor of the attribute with the given name.
    pub fn attribute(&self, name: &str) -> Option<(usize, &AttributeDescriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .find(|(_, d)| d.name == name)
    }

    /// The first geometry attribute, if any.
    pub fn default_geometry(&self) -> Option<(usize, &AttributeDescriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .find(|(_, d)| d.binding == AttributeType::Geometry)
    }

    pub fn id(&self) -> ObjectId {
        self.to_stored_object().compute_id()
    }

    pub fn to_stored_object(&self) -> StoredObject {
        let mut enc = Encoder::new();
        codec::encode_feature_type(&mut enc, self);
        StoredObject::new(ObjectKind::FeatureType, enc.finish())
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        expect_kind(obj, ObjectKind::FeatureType)?;
        decode_body(obj, codec::decode_feature_type)
    }
}

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

/// Annotated tag pointing at a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevTag {
    pub name: String,
    pub commit_id: ObjectId,
    pub message: String,
    pub tagger: Person,
}

impl RevTag {
    pub fn id(&self) -> ObjectId {
        self.to_stored_object().compute_id()
    }

    pub fn to_stored_object(&self) -> StoredObject {
        let mut enc = Encoder::new();
        codec::encode_tag(&mut enc, self);
        StoredObject::new(ObjectKind::Tag, enc.finish())
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        expect_kind(obj, ObjectKind::Tag)?;
        decode_body(obj, codec::decode_tag)
    }
}

// ---------------------------------------------------------------------------
// RevObject
// ---------------------------------------------------------------------------

/// Any revision object. The variant set is closed.
#[derive(Clone, Debug, PartialEq)]
pub enum RevObject {
    Commit(RevCommit),
    Tree(RevTree),
    Feature(RevFeature),
    FeatureType(RevFeatureType),
    Tag(RevTag),
}

impl RevObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Commit(_) => ObjectKind::Commit,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Feature(_) => ObjectKind::Feature,
            Self::FeatureType(_) => ObjectKind::FeatureType,
            Self::Tag(_) => ObjectKind::Tag,
        }
    }

    /// Canonical encoding of this object.
    pub fn encode(&self) -> StoredObject {
        match self {
            Self::Commit(c) => c.to_stored_object(),
            Self::Tree(t) => t.to_stored_object(),
            Self::Feature(f) => f.to_stored_object(),
            Self::FeatureType(ft) => ft.to_stored_object(),
            Self::Tag(t) => t.to_stored_object(),
        }
    }

    /// Decode any kind of stored object.
    pub fn decode(obj: &StoredObject) -> StoreResult<Self> {
        Ok(match obj.kind {
            ObjectKind::Commit => Self::Commit(RevCommit::from_stored_object(obj)?),
            ObjectKind::Tree => Self::Tree(RevTree::from_stored_object(obj)?),
            ObjectKind::Feature => Self::Feature(RevFeature::from_stored_object(obj)?),
            ObjectKind::FeatureType => {
                Self::FeatureType(RevFeatureType::from_stored_object(obj)?)
            }
            ObjectKind::Tag => Self::Tag(RevTag::from_stored_object(obj)?),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.encode().compute_id()
    }
}

impl From<RevCommit> for RevObject {
    fn from(v: RevCommit) -> Self {
        Self::Commit(v)
    }
}

impl From<RevTree> for RevObject {
    fn from(v: RevTree) -> Self {
        Self::Tree(v)
    }
}

impl From<RevFeature> for RevObject {
    fn from(v: RevFeature) -> Self {
        Self::Feature(v)
    }
}

impl From<RevFeatureType> for RevObject {
    fn from(v: RevFeatureType) -> Self {
        Self::FeatureType(v)
    }
}

impl From<RevTag> for RevObject {
    fn from(v: RevTag) -> Self {
        Self::Tag(v)
    }
}

fn expect_kind(obj: &StoredObject, expected: ObjectKind) -> StoreResult<()> {
    if obj.kind != expected {
        return Err(StoreError::UnexpectedKind {
            id: obj.compute_id(),
            expected,
            actual: obj.kind,
        });
    }
    Ok(())
}

fn decode_body<T>(
    obj: &StoredObject,
    body: fn(&mut Decoder<'_>) -> Result<T, String>,
) -> StoreResult<T> {
    let mut dec = Decoder::new(&obj.data);
    let result = dec.header().and_then(|_| body(&mut dec)).and_then(|value| {
        dec.finish()?;
        Ok(value)
    });
    result.map_err(|reason| StoreError::CorruptObject {
        id: obj.compute_id(),
        reason,
    })
}
