//! In-process Bloom filter for fast negative lookups.
//!
//! A Bloom filter can tell with certainty that a code was NOT issued, or that
//! it MIGHT have been (with a configurable false positive rate). The
//! resolution service uses this both when generating codes (skip codes that
//! are probably taken) and when resolving them (reject codes that were never
//! issued without touching storage).
//!
//! Bloom filters do not support deletion, which fits an alias store where
//! records are never removed.

use async_trait::async_trait;
use bloomfilter::Bloom;
use burrow_core::{FilterError, MembershipFilter, ShortCode};
use parking_lot::RwLock;
use tracing::debug;
use typed_builder::TypedBuilder;

/// Configuration for the Bloom filter.
#[derive(Debug, Clone, TypedBuilder)]
pub struct BloomFilterConfig {
    /// Expected number of codes to be inserted into the filter.
    ///
    /// Going past this keeps answers correct but raises the false positive
    /// rate.
    #[builder(default = 100_000)]
    pub expected_items: usize,

    /// Desired false positive rate as a probability between 0.0 and 1.0.
    #[builder(default = 0.001)]
    pub false_positive_rate: f64,
}

impl Default for BloomFilterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A [`MembershipFilter`] backed by an in-memory Bloom filter.
///
/// State lives only as long as the process; see
/// [`RedisMembershipFilter`](crate::RedisMembershipFilter) for a filter that
/// survives restarts, or warm this one from storage at startup.
pub struct BloomMembershipFilter {
    bloom: RwLock<Bloom<ShortCode>>,
}

impl BloomMembershipFilter {
    /// Creates an empty filter sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Initialization` if the size or rate is unusable.
    pub fn new(config: BloomFilterConfig) -> Result<Self, FilterError> {
        let bloom = Bloom::new_for_fp_rate(config.expected_items, config.false_positive_rate)
            .map_err(|e| FilterError::Initialization(e.to_string()))?;
        Ok(Self {
            bloom: RwLock::new(bloom),
        })
    }

    /// Adds many codes under a single write lock.
    pub fn extend<'a, I>(&self, codes: I) -> usize
    where
        I: IntoIterator<Item = &'a ShortCode>,
    {
        let mut guard = self.bloom.write();
        let mut count = 0;
        for code in codes {
            guard.set(code);
            count += 1;
        }
        debug!(count, "bulk inserted codes into bloom filter");
        count
    }
}

#[async_trait]
impl MembershipFilter for BloomMembershipFilter {
    async fn add(&self, code: &ShortCode) -> Result<(), FilterError> {
        self.bloom.write().set(code);
        Ok(())
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool, FilterError> {
        Ok(self.bloom.read().check(code))
    }
}
