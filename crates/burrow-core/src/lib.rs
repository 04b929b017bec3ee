//! Core types and traits for the Burrow alias-resolution engine.
//!
//! This crate holds the persistent [`AliasRecord`] model, the validated
//! [`ShortCode`] key, the error taxonomy, and the collaborator traits the
//! resolution service is written against: [`MembershipFilter`],
//! [`AliasCache`], [`AliasStore`] and [`Clock`].

pub mod cache;
pub mod clock;
pub mod error;
pub mod filter;
pub mod record;
pub mod repository;
pub mod shortcode;

pub use cache::AliasCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AliasError, CacheError, ErrorKind, FilterError, StorageError};
pub use filter::MembershipFilter;
pub use record::AliasRecord;
pub use repository::AliasStore;
pub use shortcode::ShortCode;
