use crate::shortcode::ShortCode;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// The persisted mapping from a short code to its original URL.
///
/// Records are immutable once written. Expiry is judged at read time by
/// comparing `expires_at` against the current clock; nothing deletes or
/// rewrites a row when it goes stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    /// The short code, unique across all records.
    pub code: ShortCode,
    /// The original URL that was shortened.
    pub target: String,
    /// When the engine created the record.
    pub created_at: Timestamp,
    /// Resolution fails with `Expired` from this instant on.
    pub expires_at: Timestamp,
}

impl AliasRecord {
    /// Returns `true` once `now` has reached `expires_at`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}
