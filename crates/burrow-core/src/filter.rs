use crate::error::FilterError;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use std::sync::Arc;

/// A probabilistic set of every short code ever issued.
///
/// `exists` must never return `false` for a code that was added; it may
/// return `true` for codes that never were, at a bounded rate. Filling the
/// filter past its provisioned capacity raises that rate but never produces
/// a false negative.
#[async_trait]
pub trait MembershipFilter: Send + Sync + 'static {
    /// Registers a code as present.
    async fn add(&self, code: &ShortCode) -> Result<(), FilterError>;

    /// Returns `true` if the code may have been added.
    async fn exists(&self, code: &ShortCode) -> Result<bool, FilterError>;
}

#[async_trait]
impl<T: MembershipFilter + ?Sized> MembershipFilter for Arc<T> {
    async fn add(&self, code: &ShortCode) -> Result<(), FilterError> {
        (**self).add(code).await
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool, FilterError> {
        (**self).exists(code).await
    }
}
