use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use geovc_types::ObjectId;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{RefError, Result};
use crate::names::validate_ref_name;
use crate::traits::{check_expected, check_write, RefStore};
use crate::types::Ref;

/// Reference store on the local filesystem.
///
/// Each ref is a small JSON file at `<root>/<canonical name>`. Files are
/// replaced by renaming a temporary file over them. Mutations are
/// serialized by an in-process lock; the store assumes a single process
/// owns the directory.
#[derive(Debug)]
pub struct FileRefStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileRefStore {
    /// Open (creating if needed) a ref store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("refs"))?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_ref_name(name)?;
        Ok(self.root.join(name))
    }

    fn load<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!(path = ?path, error = %e, "unreadable ref file");
                    Err(e.into())
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(value)?)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| RefError::Io(e.error))?;
        Ok(())
    }
}

impl RefStore for FileRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<Ref>> {
        if validate_ref_name(name).is_err() {
            return Ok(None);
        }
        Self::load(&self.root.join(name))
    }

    fn compare_and_swap(&self, name: &str, expected: Option<ObjectId>, new: &Ref) -> Result<()> {
        let path = self.path_for(name)?;
        let _guard = self.lock.lock().map_err(|_| RefError::LockPoisoned)?;
        let existing: Option<Ref> = Self::load(&path)?;
        check_write(name, new, existing.as_ref())?;
        check_expected(name, expected, existing.as_ref())?;
        self.store(&path, new)?;
        debug!(name, commit = %new.commit_id().short_hex(), "ref updated");
        Ok(())
    }
}
