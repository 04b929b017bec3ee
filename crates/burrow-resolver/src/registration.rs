//! Best-effort registration of new codes in the membership filter.
//!
//! A code that is persisted but missing from the filter would be reported as
//! not found, so a failed registration is never dropped silently: it is
//! counted and handed to a background task that retries with backoff.

use burrow_core::{MembershipFilter, ShortCode};
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const REGISTRATIONS_METRIC: &str = "burrow_filter_registrations_total";
const OUTCOME_LABEL: &str = "outcome";

/// Prometheus counters describing filter registration health.
///
/// Every failed inline registration bumps `outcome="inline_failure"` and,
/// once its background retry settles, exactly one of `recovered` or
/// `abandoned`.
#[derive(Debug, Clone)]
pub struct RegistrationStats {
    outcomes: IntCounterVec,
    inline_failures: IntCounter,
    recovered: IntCounter,
    abandoned: IntCounter,
}

impl RegistrationStats {
    pub fn new() -> prometheus::Result<Self> {
        let outcomes = IntCounterVec::new(
            Opts::new(
                REGISTRATIONS_METRIC,
                "Filter registrations that needed a background retry, by outcome",
            ),
            &[OUTCOME_LABEL],
        )?;

        Ok(Self {
            inline_failures: outcomes.with_label_values(&["inline_failure"]),
            recovered: outcomes.with_label_values(&["recovered"]),
            abandoned: outcomes.with_label_values(&["abandoned"]),
            outcomes,
        })
    }

    /// Exposes the counters through `registry`.
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.outcomes.clone()))
    }

    /// Registrations whose first, inline attempt failed or timed out.
    pub fn inline_failures(&self) -> u64 {
        self.inline_failures.get()
    }

    /// Registrations that a background retry eventually completed.
    pub fn recovered(&self) -> u64 {
        self.recovered.get()
    }

    /// Registrations given up on after every retry failed.
    pub fn abandoned(&self) -> u64 {
        self.abandoned.get()
    }

    /// Background retries still running.
    pub fn pending(&self) -> u64 {
        self.inline_failures()
            .saturating_sub(self.recovered())
            .saturating_sub(self.abandoned())
    }
}

/// Retries `code` on `filter` in a background task.
///
/// The n-th retry waits `backoff * 2^(n-1)`. Outside a Tokio runtime the
/// registration is abandoned immediately.
pub(crate) fn spawn_retry<F: MembershipFilter>(
    filter: Arc<F>,
    stats: Option<Arc<RegistrationStats>>,
    code: ShortCode,
    attempts: u32,
    backoff: Duration,
) {
    if let Some(stats) = &stats {
        stats.inline_failures.inc();
    }

    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            if let Some(stats) = &stats {
                stats.abandoned.inc();
            }
            error!(code = %code, "no runtime for filter registration retry, giving up");
            return;
        }
    };

    handle.spawn(async move {
        let mut delay = backoff;
        for attempt in 1..=attempts {
            tokio::time::sleep(delay).await;
            match filter.add(&code).await {
                Ok(()) => {
                    if let Some(stats) = &stats {
                        stats.recovered.inc();
                    }
                    debug!(code = %code, attempt, "filter registration recovered");
                    return;
                }
                Err(err) => {
                    warn!(code = %code, attempt, error = %err, "filter registration retry failed");
                }
            }
            delay = delay.saturating_mul(2);
        }

        if let Some(stats) = &stats {
            stats.abandoned.inc();
        }
        error!(code = %code, attempts, "filter registration abandoned");
    });
}
