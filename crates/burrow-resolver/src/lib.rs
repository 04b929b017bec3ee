//! Alias resolution service.
//!
//! [`ResolutionService`] turns long URLs into short codes and back. It is
//! written against the collaborator traits in `burrow_core`, so the same
//! service runs on the in-memory backends in tests and on PostgreSQL or
//! MySQL, Redis and Moka in production.

pub mod config;
pub mod registration;
pub mod service;
pub mod warmup;

pub use config::ResolverConfig;
pub use registration::RegistrationStats;
pub use service::{ResolutionService, ShortenOptions};
pub use warmup::warm_filter;
