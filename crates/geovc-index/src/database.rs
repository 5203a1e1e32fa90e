//! Persistent index metadata: definitions and indexed-tree mappings.
//!
//! The [`IndexDatabase`] trait stores [`IndexInfo`] records keyed by their
//! identity and the `(index, canonical tree) -> index tree` mappings that let
//! a build for an already indexed snapshot return without work.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use geovc_types::ObjectId;

use crate::error::{IndexError, IndexResult};
use crate::info::IndexInfo;

/// Storage for index definitions and indexed-tree mappings.
pub trait IndexDatabase: Send + Sync {
    /// Persist `info`, or return the existing record with the same identity.
    ///
    /// Check and insert happen atomically: concurrent identical calls all
    /// succeed and leave exactly one record. Fails with
    /// [`IndexError::State`] if a record with the same identity but
    /// different type or metadata exists.
    fn create_index_info(&self, info: IndexInfo) -> IndexResult<IndexInfo>;

    /// The index on `attribute_name` of `tree_name`, if defined.
    fn get_index_info(&self, tree_name: &str, attribute_name: &str) -> IndexResult<Option<IndexInfo>>;

    /// Every index defined on `tree_name`, ordered by attribute.
    fn index_infos(&self, tree_name: &str) -> IndexResult<Vec<IndexInfo>>;

    /// Remove a definition and all its mappings. Returns `false` if absent.
    fn drop_index_info(&self, info_id: &ObjectId) -> IndexResult<bool>;

    /// Record that `indexed` is the index tree of `canonical`.
    ///
    /// Re-recording the same mapping is a no-op; recording a different
    /// index tree for an already mapped canonical tree is a state error.
    fn add_indexed_tree(&self, info_id: &ObjectId, canonical: &ObjectId, indexed: &ObjectId) -> IndexResult<()>;

    /// The index tree recorded for `canonical`, if any.
    fn resolve_indexed_tree(&self, info_id: &ObjectId, canonical: &ObjectId) -> IndexResult<Option<ObjectId>>;

    /// Every `(canonical, indexed)` pair recorded for an index.
    fn indexed_trees(&self, info_id: &ObjectId) -> IndexResult<Vec<(ObjectId, ObjectId)>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    infos: BTreeMap<ObjectId, IndexInfo>,
    mappings: BTreeMap<(ObjectId, ObjectId), ObjectId>,
}

/// In-memory [`IndexDatabase`] that can be checkpointed to bytes.
#[derive(Debug, Default)]
pub struct InMemoryIndexDatabase {
    tables: RwLock<Tables>,
}

impl InMemoryIndexDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize every record to bincode bytes.
    pub fn to_bytes(&self) -> IndexResult<Vec<u8>> {
        let tables = self.tables.read().map_err(|_| IndexError::LockPoisoned)?;
        bincode::serialize(&*tables).map_err(|e| IndexError::Serialization(e.to_string()))
    }

    /// Restore a database from [`to_bytes`](Self::to_bytes) output.
    pub fn from_bytes(bytes: &[u8]) -> IndexResult<Self> {
        let tables: Tables =
            bincode::deserialize(bytes).map_err(|e| IndexError::Serialization(e.to_string()))?;
        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    /// Number of index definitions.
    pub fn len(&self) -> usize {
        self.tables.read().expect("lock poisoned").infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IndexDatabase for InMemoryIndexDatabase {
    fn create_index_info(&self, info: IndexInfo) -> IndexResult<IndexInfo> {
        let id = info.id();
        let mut tables = self.tables.write().map_err(|_| IndexError::LockPoisoned)?;
        if let Some(existing) = tables.infos.get(&id) {
            if existing.index_type != info.index_type || existing.metadata != info.metadata {
                return Err(IndexError::State(format!(
                    "{existing} already exists with different settings"
                )));
            }
            return Ok(existing.clone());
        }
        debug!(index = %info, id = %id.short_hex(), "index definition created");
        tables.infos.insert(id, info.clone());
        Ok(info)
    }

    fn get_index_info(&self, tree_name: &str, attribute_name: &str) -> IndexResult<Option<IndexInfo>> {
        let tables = self.tables.read().map_err(|_| IndexError::LockPoisoned)?;
        Ok(tables
            .infos
            .get(&IndexInfo::id_for(tree_name, attribute_name))
            .cloned())
    }

    fn index_infos(&self, tree_name: &str) -> IndexResult<Vec<IndexInfo>> {
        let tables = self.tables.read().map_err(|_| IndexError::LockPoisoned)?;
        let mut infos: Vec<IndexInfo> = tables
            .infos
            .values()
            .filter(|i| i.tree_name == tree_name)
            .cloned()
            .collect();
        infos.sort_by(|a, b| a.attribute_name.cmp(&b.attribute_name));
        Ok(infos)
    }

    fn drop_index_info(&self, info_id: &ObjectId) -> IndexResult<bool> {
        let mut tables = self.tables.write().map_err(|_| IndexError::LockPoisoned)?;
        if tables.infos.remove(info_id).is_none() {
            return Ok(false);
        }
        tables.mappings.retain(|(info, _), _| info != info_id);
        Ok(true)
    }

    fn add_indexed_tree(&self, info_id: &ObjectId, canonical: &ObjectId, indexed: &ObjectId) -> IndexResult<()> {
        let mut tables = self.tables.write().map_err(|_| IndexError::LockPoisoned)?;
        if !tables.infos.contains_key(info_id) {
            return Err(IndexError::NotFound(*info_id));
        }
        match tables.mappings.get(&(*info_id, *canonical)) {
            Some(existing) if existing == indexed => Ok(()),
            Some(existing) => Err(IndexError::State(format!(
                "canonical tree {canonical} already maps to {existing}, not {indexed}"
            ))),
            None => {
                tables.mappings.insert((*info_id, *canonical), *indexed);
                Ok(())
            }
        }
    }

    fn resolve_indexed_tree(&self, info_id: &ObjectId, canonical: &ObjectId) -> IndexResult<Option<ObjectId>> {
        let tables = self.tables.read().map_err(|_| IndexError::LockPoisoned)?;
        Ok(tables.mappings.get(&(*info_id, *canonical)).copied())
    }

    fn indexed_trees(&self, info_id: &ObjectId) -> IndexResult<Vec<(ObjectId, ObjectId)>> {
        let tables = self.tables.read().map_err(|_| IndexError::LockPoisoned)?;
        Ok(tables
            .mappings
            .range((*info_id, ObjectId::NULL)..)
            .take_while(|((info, _), _)| info == info_id)
            .map(|((_, canonical), indexed)| (*canonical, *indexed))
            .collect())
    }
}

/// File name of the index database inside a repository root.
pub const INDEX_DATABASE_FILE: &str = "indexes.bin";

/// File-backed [`IndexDatabase`].
///
/// Records live in an [`InMemoryIndexDatabase`] and every mutation is
/// checkpointed to a single bincode file, written to a temp file and
/// renamed into place so readers never see a partial checkpoint.
#[derive(Debug)]
pub struct FileIndexDatabase {
    path: PathBuf,
    inner: InMemoryIndexDatabase,
    // Serializes mutate-then-checkpoint so checkpoints land in order.
    writer: Mutex<()>,
}

impl FileIndexDatabase {
    /// Open the database stored at `path`, starting empty if the file is missing.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = match fs::read(&path) {
            Ok(bytes) => InMemoryIndexDatabase::from_bytes(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => InMemoryIndexDatabase::new(),
            Err(e) => return Err(IndexError::Io(e)),
        };
        info!(path = %path.display(), indexes = inner.len(), "index database opened");
        Ok(Self {
            path,
            inner,
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of index definitions.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn checkpoint(&self) -> IndexResult<()> {
        let bytes = self.inner.to_bytes()?;
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| IndexError::Io(e.error))?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "index database checkpointed");
        Ok(())
    }

    fn mutate<T>(&self, op: impl FnOnce(&InMemoryIndexDatabase) -> IndexResult<T>) -> IndexResult<T> {
        let _guard = self.writer.lock().map_err(|_| IndexError::LockPoisoned)?;
        let out = op(&self.inner)?;
        self.checkpoint()?;
        Ok(out)
    }
}

impl IndexDatabase for FileIndexDatabase {
    fn create_index_info(&self, info: IndexInfo) -> IndexResult<IndexInfo> {
        self.mutate(|db| db.create_index_info(info))
    }

    fn get_index_info(&self, tree_name: &str, attribute_name: &str) -> IndexResult<Option<IndexInfo>> {
        self.inner.get_index_info(tree_name, attribute_name)
    }

    fn index_infos(&self, tree_name: &str) -> IndexResult<Vec<IndexInfo>> {
        self.inner.index_infos(tree_name)
    }

    fn drop_index_info(&self, info_id: &ObjectId) -> IndexResult<bool> {
        self.mutate(|db| db.drop_index_info(info_id))
    }

    fn add_indexed_tree(&self, info_id: &ObjectId, canonical: &ObjectId, indexed: &ObjectId) -> IndexResult<()> {
        self.mutate(|db| db.add_indexed_tree(info_id, canonical, indexed))
    }

    fn resolve_indexed_tree(&self, info_id: &ObjectId, canonical: &ObjectId) -> IndexResult<Option<ObjectId>> {
        self.inner.resolve_indexed_tree(info_id, canonical)
    }

    fn indexed_trees(&self, info_id: &ObjectId) -> IndexResult<Vec<(ObjectId, ObjectId)>> {
        self.inner.indexed_trees(info_id)
    }
}
