//! In-memory history store.

use super::{HistoryStore, select};
use crate::models::{HistoryRecord, OwnerId};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// History store backed by a map, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: Mutex<HashMap<OwnerId, Vec<HistoryRecord>>>,
}

impl MemoryHistoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<OwnerId, Vec<HistoryRecord>>>> {
        self.records
            .lock()
            .map_err(|e| Error::operation("history_lock", e))
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(&self, record: HistoryRecord) -> Result<()> {
        self.lock()?.entry(record.owner).or_default().push(record);
        Ok(())
    }

    fn query(
        &self,
        owner: OwnerId,
        kind: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryRecord>> {
        let records = self.lock()?.get(&owner).cloned().unwrap_or_default();
        Ok(select(records, kind, limit))
    }

    fn clear(&self, owner: OwnerId) -> Result<usize> {
        Ok(self.lock()?.remove(&owner).map_or(0, |records| records.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owners_are_isolated() {
        let store = MemoryHistoryStore::new();
        store
            .append(HistoryRecord::new(OwnerId::new(1), "a", "video"))
            .unwrap();
        store
            .append(HistoryRecord::new(OwnerId::new(2), "b", "photo"))
            .unwrap();

        assert_eq!(store.query(OwnerId::new(1), None, None).unwrap().len(), 1);
        assert_eq!(store.clear(OwnerId::new(1)).unwrap(), 1);
        assert!(store.query(OwnerId::new(1), None, None).unwrap().is_empty());
        assert_eq!(store.latest(OwnerId::new(2), 5).unwrap()[0].name, "b");
    }
}
