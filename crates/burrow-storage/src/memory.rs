use async_trait::async_trait;
use burrow_core::repository::Result;
use burrow_core::{AliasRecord, AliasStore, ShortCode, StorageError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// In-memory implementation of [`AliasStore`] using DashMap.
///
/// DashMap shards its locks, so concurrent inserts and lookups on different
/// codes do not block each other. Inserting an existing code fails with
/// [`StorageError::Conflict`], mirroring a primary-key violation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAliasStore {
    storage: DashMap<ShortCode, AliasRecord>,
}

impl InMemoryAliasStore {
    /// Creates a new in-memory store.
    pub fn new() -> Self {
        Self {
            storage: DashMap::new(),
        }
    }

    /// Creates a new in-memory store with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: DashMap::with_capacity(capacity),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[async_trait]
impl AliasStore for InMemoryAliasStore {
    async fn insert(&self, record: &AliasRecord) -> Result<()> {
        match self.storage.entry(record.code.clone()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(record.code.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn find_by_code(&self, code: &ShortCode) -> Result<Option<AliasRecord>> {
        Ok(self.storage.get(code).map(|entry| entry.value().clone()))
    }

    async fn list_codes(&self, after: Option<&ShortCode>, limit: usize) -> Result<Vec<ShortCode>> {
        let mut codes: Vec<ShortCode> = self
            .storage
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|code| after.map_or(true, |after| code > after))
            .collect();
        codes.sort_unstable();
        codes.truncate(limit);
        Ok(codes)
    }
}
