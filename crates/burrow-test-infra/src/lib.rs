//! Disposable containers for Burrow integration tests.

pub mod error;
pub mod mysql;
pub mod postgres;
pub mod redis;

pub use error::{Result, TestInfraError};
