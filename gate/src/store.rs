//! Persistent string key-value storage, standing in for the platform
//! preference store. Holds the installation id and the last resolved URL.
use crate::config::StoreConfig;
use crate::errors::StoreError;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn store(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

pub fn from_config(config: &StoreConfig) -> Arc<dyn KeyValueStore> {
    match config {
        StoreConfig::Filesystem { base_dir, filename } => {
            Arc::new(FilesystemStore::new(base_dir, filename))
        }
        StoreConfig::Memory => Arc::new(MemoryStore::default()),
    }
}

#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn store(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// All keys live in a single JSON object file which is rewritten on every store.
pub struct FilesystemStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FilesystemStore {
    pub fn new(base_dir: &str, filename: &str) -> Self {
        FilesystemStore {
            path: Path::new(base_dir).join(filename),
            write_lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

impl KeyValueStore for FilesystemStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn store(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();

        let mut values = match self.read_all() {
            Ok(values) => values,
            // A damaged file would otherwise block every later write
            Err(StoreError::Json(e)) => {
                tracing::warn!(error = %e, path = ?self.path, "Discarding unreadable store file");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        values.insert(key.to_string(), value.to_string());

        // Write a sibling temp file and rename it over the target, so readers
        // never see a partial file.
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &values)?;
            writer.flush()?;
        }
        tmp.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!(path = ?self.path, key, "Stored value");
        Ok(())
    }
}
