//! Durable storage gateways for alias records.

pub mod memory;
pub mod mysql;
pub mod postgres;
mod sql;

pub use burrow_core::repository::{AliasStore, Result};
pub use burrow_core::StorageError;
pub use memory::InMemoryAliasStore;
pub use mysql::MySqlAliasStore;
pub use postgres::PostgresAliasStore;
