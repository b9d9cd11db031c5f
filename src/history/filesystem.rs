//! Filesystem history store.
//!
//! One JSON array per owner at `{base}/{owner}.json`. Writes go to a
//! temporary sibling and are renamed into place so a crash never leaves a
//! half-written log.

use super::{HistoryStore, select};
use crate::models::{HistoryRecord, OwnerId};
use crate::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, instrument};

/// History store persisting one JSON file per owner.
#[derive(Debug)]
pub struct FilesystemHistoryStore {
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FilesystemHistoryStore {
    /// Creates a store rooted at `base_path`, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).map_err(|e| Error::operation("create_history_dir", e))?;
        Ok(Self {
            base_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Base directory.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn owner_path(&self, owner: OwnerId) -> PathBuf {
        self.base_path.join(format!("{owner}.json"))
    }

    fn load(path: &Path) -> Result<Vec<HistoryRecord>> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::operation("read_history", e)),
        };
        serde_json::from_slice(&data).map_err(|e| {
            Error::operation("parse_history", format!("{}: {e}", path.display()))
        })
    }

    fn save(path: &Path, records: &[HistoryRecord]) -> Result<()> {
        let data = serde_json::to_vec_pretty(records)
            .map_err(|e| Error::operation("serialize_history", e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(|e| Error::operation("write_history", e))?;
        fs::rename(&tmp, path).map_err(|e| Error::operation("write_history", e))
    }
}

impl HistoryStore for FilesystemHistoryStore {
    #[instrument(skip(self, record), fields(owner = %record.owner, kind = %record.kind))]
    fn append(&self, record: HistoryRecord) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| Error::operation("history_lock", e))?;
        let path = self.owner_path(record.owner);
        let mut records = Self::load(&path)?;
        records.push(record);
        Self::save(&path, &records)?;
        debug!(count = records.len(), "History record appended");
        Ok(())
    }

    fn query(
        &self,
        owner: OwnerId,
        kind: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryRecord>> {
        let records = Self::load(&self.owner_path(owner))?;
        Ok(select(records, kind, limit))
    }

    fn clear(&self, owner: OwnerId) -> Result<usize> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| Error::operation("history_lock", e))?;
        let path = self.owner_path(owner);
        let count = Self::load(&path).map_or(0, |records| records.len());
        match fs::remove_file(&path) {
            Ok(()) => Ok(count),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(Error::operation("clear_history", e)),
        }
    }
}
