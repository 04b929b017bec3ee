//! Membership filter and cache implementations for the Burrow engine.

pub mod bloom_filter;
pub mod moka;
pub mod redis_bloom;

pub use bloom_filter::{BloomFilterConfig, BloomMembershipFilter};
pub use moka::{MokaAliasCache, MokaCacheConfig};
pub use redis_bloom::{RedisBloomConfig, RedisMembershipFilter};
