use async_trait::async_trait;
use burrow_core::cache::Result;
use burrow_core::{AliasCache, AliasRecord, ShortCode};
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

/// Default time a record stays cached after insertion.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Default memory budget, in bytes of key plus target URL.
pub const DEFAULT_CAPACITY_BYTES: u64 = 100 * 1024 * 1024;

/// Rough per-entry overhead added to the weight of every entry.
const ENTRY_OVERHEAD_BYTES: u32 = 64;

#[derive(Debug, Clone)]
struct CachedEntry {
    record: AliasRecord,
    ttl: Duration,
}

/// Expires each entry after the TTL it was inserted with.
struct PerEntryTtl;

impl Expiry<String, CachedEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

fn weigh(key: &String, value: &CachedEntry) -> u32 {
    let bytes = key.len() + value.record.target.len();
    u32::try_from(bytes)
        .unwrap_or(u32::MAX)
        .saturating_add(ENTRY_OVERHEAD_BYTES)
}

/// An in-memory [`AliasCache`] built on Moka.
///
/// Memory is bounded by weight: every entry weighs the bytes of its key and
/// target URL, and the cache evicts once the total passes the configured
/// budget. Each entry expires after the TTL passed to [`AliasCache::set`].
#[derive(Debug, Clone)]
pub struct MokaAliasCache {
    cache: Cache<String, CachedEntry>,
}

impl MokaAliasCache {
    /// Creates a cache with the default 100 MiB budget.
    pub fn new() -> Self {
        Self::with_capacity_bytes(DEFAULT_CAPACITY_BYTES)
    }

    /// Creates a cache bounded to roughly `capacity_bytes` of keys and targets.
    pub fn with_capacity_bytes(capacity_bytes: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity_bytes)
            .weigher(weigh)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Returns a builder for creating a custom cache configuration.
    pub fn builder() -> MokaCacheConfigBuilder {
        MokaCacheConfig::builder()
    }

    /// Number of live entries, after running pending maintenance.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

impl Default for MokaAliasCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AliasCache for MokaAliasCache {
    async fn get(&self, code: &ShortCode) -> Result<Option<AliasRecord>> {
        trace!(code = %code, "fetching alias record from moka cache");

        match self.cache.get(code.as_str()).await {
            Some(entry) => {
                debug!(code = %code, "cache hit in moka");
                Ok(Some(entry.record))
            }
            None => {
                trace!(code = %code, "cache miss in moka");
                Ok(None)
            }
        }
    }

    async fn set(&self, code: &ShortCode, record: &AliasRecord, ttl: Duration) -> Result<()> {
        trace!(code = %code, ttl_secs = ttl.as_secs(), "storing alias record in moka cache");

        let entry = CachedEntry {
            record: record.clone(),
            ttl,
        };
        self.cache.insert(code.as_str().to_string(), entry).await;
        debug!(code = %code, "cached record in moka");
        Ok(())
    }
}

/// Configuration for creating a [`MokaAliasCache`].
#[derive(Debug, TypedBuilder)]
pub struct MokaCacheConfig {
    /// Memory budget in bytes of keys and targets.
    #[builder(default = DEFAULT_CAPACITY_BYTES)]
    capacity_bytes: u64,
    /// Evict entries that were not read for this long, on top of their TTL.
    #[builder(default, setter(strip_option))]
    tti: Option<Duration>,
}

impl From<MokaCacheConfig> for MokaAliasCache {
    fn from(config: MokaCacheConfig) -> Self {
        let mut builder = Cache::builder()
            .max_capacity(config.capacity_bytes)
            .weigher(weigh)
            .expire_after(PerEntryTtl);

        if let Some(tti) = config.tti {
            builder = builder.time_to_idle(tti);
        }

        MokaAliasCache {
            cache: builder.build(),
        }
    }
}
