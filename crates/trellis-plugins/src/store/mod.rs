//! Persistence for per-plugin execution records.
//!
//! An [`ExecutionRecord`] holds the enabled flag and secret token for one
//! plugin. Stores are keyed by [`PluginId`] and never delete records.
//! [`JsonFileStore`] keeps every record in one JSON object on disk and
//! replaces the file atomically on each write; [`MemoryStore`] backs tests
//! and ephemeral deployments.
//!
//! Writers to a [`JsonFileStore`] hold an exclusive `flock` on a sibling
//! `.lock` file for the whole read-modify-write, so the daemon and the
//! `trellis-token` helper can update the same file concurrently.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StoreError;
use crate::identity::PluginId;

/// Tracing target for store operations.
const STORE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::store");

/// Persisted execution state of one plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Whether the operator has enabled the plugin.
    #[serde(default)]
    pub enabled: bool,
    /// Secret token handed to the plugin at launch.
    #[serde(default)]
    pub app_secret_token: String,
}

impl ExecutionRecord {
    /// Returns `true` when the token contains something other than
    /// whitespace.
    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.app_secret_token.trim().is_empty()
    }
}

/// Storage backend for execution records.
pub trait ExecutionStore: Send + Sync {
    /// Loads the record for `id`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend cannot be read.
    fn load(&self, id: &PluginId) -> Result<Option<ExecutionRecord>, StoreError>;

    /// Creates or replaces the record for `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend cannot be written.
    fn save(&self, id: &PluginId, record: &ExecutionRecord) -> Result<(), StoreError>;

    /// Loads the record for `id`, applies `update`, and saves the result.
    ///
    /// A missing record starts from [`ExecutionRecord::default`].
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when loading or saving fails.
    fn update(
        &self,
        id: &PluginId,
        update: &mut dyn FnMut(&mut ExecutionRecord),
    ) -> Result<ExecutionRecord, StoreError> {
        let mut record = self.load(id)?.unwrap_or_default();
        update(&mut record);
        self.save(id, &record)?;
        Ok(record)
    }
}

/// Volatile store holding records in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<PluginId, ExecutionRecord>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionStore for MemoryStore {
    fn load(&self, id: &PluginId) -> Result<Option<ExecutionRecord>, StoreError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(id).cloned())
    }

    fn save(&self, id: &PluginId, record: &ExecutionRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(id.clone(), record.clone());
        Ok(())
    }
}

/// Store persisting every record in a single JSON file.
///
/// The file holds an object keyed by plugin id. Writes go to a temporary file
/// in the same directory which is then renamed over the original, so readers
/// never observe a partial document. Writers serialise on an advisory lock
/// taken on `<file>.lock`, across threads and processes alike.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

type RecordMap = BTreeMap<PluginId, ExecutionRecord>;

impl JsonFileStore {
    /// Creates a store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the advisory lock file guarding writes.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| OsString::from("store"), ToOwned::to_owned);
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source: Arc::new(source),
        }
    }

    fn read_all(&self) -> Result<RecordMap, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(RecordMap::new()),
            Err(err) => return Err(self.io_error(err)),
        };
        if contents.trim().is_empty() {
            return Ok(RecordMap::new());
        }
        serde_json::from_str(&contents).map_err(|err| StoreError::Corrupt {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }

    fn directory(&self) -> &Path {
        self.path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    /// Takes the in-process mutex, then the exclusive file lock. Both are
    /// released when the returned guard drops.
    fn lock_for_write(&self) -> Result<WriteGuard<'_>, StoreError> {
        let local = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        fs::create_dir_all(self.directory()).map_err(|err| self.io_error(err))?;
        let lock_path = self.lock_path();
        let lock_error = |source: io::Error| StoreError::Io {
            path: lock_path.clone(),
            source: Arc::new(source),
        };
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(lock_error)?;
        let file_lock = Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| lock_error(io::Error::from(errno)))?;
        Ok(WriteGuard {
            _file: file_lock,
            _local: local,
        })
    }

    fn write_all(&self, records: &RecordMap) -> Result<(), StoreError> {
        let directory = self.directory();
        fs::create_dir_all(directory).map_err(|err| self.io_error(err))?;

        let json = serde_json::to_vec_pretty(records).map_err(|err| StoreError::Corrupt {
            path: self.path.clone(),
            message: err.to_string(),
        })?;
        let mut staged = NamedTempFile::new_in(directory).map_err(|err| self.io_error(err))?;
        staged
            .write_all(&json)
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|err| self.io_error(err))?;
        staged
            .persist(&self.path)
            .map_err(|err| self.io_error(err.error))?;
        debug!(
            target: STORE_TARGET,
            path = %self.path.display(),
            records = records.len(),
            "execution store written"
        );
        Ok(())
    }
}

impl ExecutionStore for JsonFileStore {
    fn load(&self, id: &PluginId) -> Result<Option<ExecutionRecord>, StoreError> {
        Ok(self.read_all()?.remove(id))
    }

    fn save(&self, id: &PluginId, record: &ExecutionRecord) -> Result<(), StoreError> {
        let _guard = self.lock_for_write()?;
        let mut records = self.read_all()?;
        records.insert(id.clone(), record.clone());
        self.write_all(&records)
    }

    fn update(
        &self,
        id: &PluginId,
        update: &mut dyn FnMut(&mut ExecutionRecord),
    ) -> Result<ExecutionRecord, StoreError> {
        let _guard = self.lock_for_write()?;
        let mut records = self.read_all()?;
        let record = records.entry(id.clone()).or_default();
        update(record);
        let updated = record.clone();
        self.write_all(&records)?;
        Ok(updated)
    }
}

/// Held for the duration of a read-modify-write; field order releases the
/// file lock before the mutex.
struct WriteGuard<'store> {
    _file: Flock<File>,
    _local: MutexGuard<'store, ()>,
}
