use crate::error::StorageError;
use crate::record::AliasRecord;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use std::sync::Arc;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Durable storage for alias records.
///
/// Implementations enforce code uniqueness themselves: inserting a code that
/// already exists must fail with [`StorageError::Conflict`]. Reads may be
/// served by a different endpoint than writes, but a record inserted through
/// an instance must be readable through the same instance right away.
#[async_trait]
pub trait AliasStore: Send + Sync + 'static {
    /// Inserts a new record. Returns `Err(Conflict)` if the code already exists.
    async fn insert(&self, record: &AliasRecord) -> Result<()>;

    /// Retrieves the record for a given short code.
    /// Returns `None` if no record has that code. Expired records are returned
    /// as stored; judging expiry is the caller's job.
    async fn find_by_code(&self, code: &ShortCode) -> Result<Option<AliasRecord>>;

    /// Lists stored codes in ascending order, starting strictly after `after`.
    ///
    /// Used to page through every code when warming a membership filter.
    async fn list_codes(&self, after: Option<&ShortCode>, limit: usize) -> Result<Vec<ShortCode>>;
}

#[async_trait]
impl<T: AliasStore + ?Sized> AliasStore for Arc<T> {
    async fn insert(&self, record: &AliasRecord) -> Result<()> {
        (**self).insert(record).await
    }

    async fn find_by_code(&self, code: &ShortCode) -> Result<Option<AliasRecord>> {
        (**self).find_by_code(code).await
    }

    async fn list_codes(&self, after: Option<&ShortCode>, limit: usize) -> Result<Vec<ShortCode>> {
        (**self).list_codes(after, limit).await
    }
}
