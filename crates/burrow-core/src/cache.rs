use crate::error::CacheError;
use crate::record::AliasRecord;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Type alias for cache results.
pub type Result<T> = std::result::Result<T, CacheError>;

/// A process-local cache of alias records keyed by [`ShortCode`].
///
/// The cache is an optimization, never a source of truth. Only records that
/// were found in storage are put here; a miss is never remembered.
#[async_trait]
pub trait AliasCache: Send + Sync + 'static {
    /// Get an alias record from the cache.
    ///
    /// Returns `Ok(None)` if the key is not in the cache or its entry has
    /// outlived its TTL.
    async fn get(&self, code: &ShortCode) -> Result<Option<AliasRecord>>;

    /// Store an alias record for `ttl`.
    ///
    /// The TTL bounds how long the cached copy lives and is unrelated to the
    /// record's own `expires_at`.
    async fn set(&self, code: &ShortCode, record: &AliasRecord, ttl: Duration) -> Result<()>;
}

#[async_trait]
impl<T: AliasCache + ?Sized> AliasCache for Arc<T> {
    async fn get(&self, code: &ShortCode) -> Result<Option<AliasRecord>> {
        (**self).get(code).await
    }

    async fn set(&self, code: &ShortCode, record: &AliasRecord, ttl: Duration) -> Result<()> {
        (**self).set(code, record, ttl).await
    }
}
