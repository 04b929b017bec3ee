use burrow_core::shortcode::DEFAULT_LENGTH;
use jiff::SignedDuration;
use std::time::Duration;
use typed_builder::TypedBuilder;

/// Lifetime of an alias created without an explicit expiry.
pub const DEFAULT_ALIAS_TTL: SignedDuration = SignedDuration::from_hours(72);

/// How long a resolved record stays in the cache.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Deadline applied to `shorten` and `resolve` when the caller gives none.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for [`ResolutionService`](crate::ResolutionService).
#[derive(Debug, Clone, TypedBuilder)]
pub struct ResolverConfig {
    /// Length of generated codes.
    #[builder(default = DEFAULT_LENGTH)]
    pub code_length: usize,

    /// Expiry applied when the caller does not pick one.
    #[builder(default = DEFAULT_ALIAS_TTL)]
    pub default_ttl: SignedDuration,

    /// TTL of cache entries populated on resolve.
    #[builder(default = DEFAULT_CACHE_TTL)]
    pub cache_ttl: Duration,

    /// Candidates drawn per persist attempt before giving up.
    #[builder(default = 10)]
    pub max_generation_attempts: u32,

    /// Times a storage conflict is answered with a fresh code. `0` fails on
    /// the first conflict.
    #[builder(default = 3)]
    pub max_conflict_retries: u32,

    /// Background retries of a failed filter registration.
    #[builder(default = 3)]
    pub filter_retry_attempts: u32,

    /// Delay before the first background retry; doubles on each attempt.
    #[builder(default = Duration::from_millis(100))]
    pub filter_retry_backoff: Duration,

    /// Deadline for `shorten` and `resolve`.
    #[builder(default = DEFAULT_OPERATION_TIMEOUT)]
    pub operation_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
