use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use geovc_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoredObject};
use crate::traits::ObjectStore;

const MAGIC: &[u8; 4] = b"GVCO";
const FILE_VERSION: u8 = 1;
const HEADER_LEN: usize = 10;

/// Loose-object store on the local filesystem.
///
/// Objects live under `<root>/objects/<2 hex>/<62 hex>`. Each file is:
///
/// ```text
/// [4 bytes: magic "GVCO"]
/// [1 byte:  file format version]
/// [1 byte:  object kind tag]
/// [4 bytes: CRC32 of the compressed payload (little-endian u32)]
/// [N bytes: zstd-compressed canonical encoding]
/// ```
///
/// Files are written to a temporary file in the same directory tree and
/// renamed into place, so readers only ever see complete objects.
#[derive(Debug)]
pub struct FileObjectStore {
    objects_dir: PathBuf,
    compression_level: i32,
    sync: bool,
}

impl FileObjectStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let objects_dir = root.as_ref().join("objects");
        fs::create_dir_all(&objects_dir)?;
        Ok(Self {
            objects_dir,
            compression_level: 3,
            sync: false,
        })
    }

    /// zstd level used for new objects.
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// `fsync` each object before it is renamed into place.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// Path of the loose file for `id`.
    pub fn path_for(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    /// Every object id present on disk, sorted. Stray files are skipped.
    pub fn all_ids(&self) -> StoreResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for entry in WalkDir::new(&self.objects_dir).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|e| StoreError::Io(io::Error::other(e.to_string())))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let dir = entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let name = entry.file_name().to_str().unwrap_or_default();
            match format!("{dir}{name}").parse::<ObjectId>() {
                Ok(id) => ids.push(id),
                Err(_) => debug!(path = ?entry.path(), "skipping non-object file"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn encode_file(&self, object: &StoredObject) -> StoreResult<Vec<u8>> {
        let compressed = zstd::encode_all(object.data.as_slice(), self.compression_level)?;
        let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
        out.extend_from_slice(MAGIC);
        out.push(FILE_VERSION);
        out.push(object.kind.tag());
        out.extend_from_slice(&crc32fast::hash(&compressed).to_le_bytes());
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    fn decode_file(&self, id: &ObjectId, bytes: &[u8]) -> StoreResult<StoredObject> {
        let corrupt = |reason: String| StoreError::CorruptObject { id: *id, reason };
        if bytes.len() < HEADER_LEN {
            return Err(corrupt(format!("file too short ({} bytes)", bytes.len())));
        }
        if &bytes[..4] != MAGIC {
            return Err(corrupt("bad magic".into()));
        }
        if bytes[4] != FILE_VERSION {
            return Err(corrupt(format!("unsupported file version {}", bytes[4])));
        }
        let kind = ObjectKind::from_tag(bytes[5])
            .ok_or_else(|| corrupt(format!("unknown kind tag {}", bytes[5])))?;
        let expected_crc = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let compressed = &bytes[HEADER_LEN..];
        let actual_crc = crc32fast::hash(compressed);
        if actual_crc != expected_crc {
            return Err(corrupt(format!(
                "crc mismatch: expected {expected_crc:08x}, got {actual_crc:08x}"
            )));
        }
        let data = zstd::decode_all(compressed)
            .map_err(|e| corrupt(format!("decompression failed: {e}")))?;
        let object = StoredObject::new(kind, data);
        let computed = object.compute_id();
        if computed != *id {
            return Err(StoreError::HashMismatch {
                id: *id,
                expected: id.to_hex(),
                computed: computed.to_hex(),
            });
        }
        Ok(object)
    }
}

impl ObjectStore for FileObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let bytes = match fs::read(self.path_for(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match self.decode_file(id, &bytes) {
            Ok(object) => Ok(Some(object)),
            Err(e) => {
                warn!(id = %id.short_hex(), error = %e, "corrupt loose object");
                Err(e)
            }
        }
    }

    fn write(&self, object: &StoredObject) -> StoreResult<bool> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let path = self.path_for(&id);
        if path.exists() {
            return Ok(false);
        }
        let dir = path.parent().unwrap_or(&self.objects_dir);
        fs::create_dir_all(dir)?;

        let bytes = self.encode_file(object)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        if self.sync {
            tmp.as_file().sync_all()?;
        }
        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                debug!(id = %id.short_hex(), kind = %object.kind, size = bytes.len(), "object written");
                Ok(true)
            }
            // Lost a race with a concurrent writer of the same content.
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.error.into()),
        }
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.path_for(id).is_file())
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
