//! Membership filter backed by a Redis bloom filter (`BF.*` commands).
//!
//! The filter lives on the Redis server, so it survives process restarts and
//! is shared by every engine instance pointing at the same namespace key.

use async_trait::async_trait;
use burrow_core::{FilterError, MembershipFilter, ShortCode};
use redis::aio::MultiplexedConnection;
use tracing::{debug, info, trace, warn};
use typed_builder::TypedBuilder;

/// Settings for the server-side bloom filter.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RedisBloomConfig {
    /// Redis key holding the filter.
    #[builder(default = "burrow:codes".to_string(), setter(into))]
    pub namespace: String,
    /// Error rate passed to `BF.RESERVE`.
    #[builder(default = 0.001)]
    pub error_rate: f64,
    /// Initial capacity passed to `BF.RESERVE`.
    #[builder(default = 100_000)]
    pub capacity: u64,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> FilterError {
    let message = format!("{operation}: {err}");
    if err.is_io_error() {
        FilterError::Unavailable(message)
    } else {
        FilterError::Operation(message)
    }
}

/// A [`MembershipFilter`] stored in Redis.
#[derive(Debug, Clone)]
pub struct RedisMembershipFilter {
    conn: MultiplexedConnection,
    namespace: String,
}

impl RedisMembershipFilter {
    /// Connects the filter to `conn`, reserving the namespace key if it does
    /// not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Initialization` if the key cannot be inspected or
    /// reserved.
    pub async fn new(
        conn: MultiplexedConnection,
        config: RedisBloomConfig,
    ) -> Result<Self, FilterError> {
        let mut setup = conn.clone();

        let exists: bool = redis::cmd("EXISTS")
            .arg(&config.namespace)
            .query_async(&mut setup)
            .await
            .map_err(|e| FilterError::Initialization(format!("failed to inspect filter: {e}")))?;

        if exists {
            debug!(namespace = %config.namespace, "reusing existing redis bloom filter");
        } else {
            info!(
                namespace = %config.namespace,
                error_rate = config.error_rate,
                capacity = config.capacity,
                "creating redis bloom filter"
            );
            let reserved: redis::RedisResult<()> = redis::cmd("BF.RESERVE")
                .arg(&config.namespace)
                .arg(config.error_rate)
                .arg(config.capacity)
                .query_async(&mut setup)
                .await;

            match reserved {
                Ok(()) => {}
                // Another instance reserved the key between EXISTS and BF.RESERVE.
                Err(e) if e.to_string().contains("item exists") => {
                    debug!(namespace = %config.namespace, "redis bloom filter reserved concurrently");
                }
                Err(e) => {
                    return Err(FilterError::Initialization(format!(
                        "failed to reserve filter: {e}"
                    )))
                }
            }
        }

        Ok(Self {
            conn,
            namespace: config.namespace,
        })
    }

    /// Opens a connection from a Redis URL and initializes the filter.
    pub async fn connect(redis_url: &str, config: RedisBloomConfig) -> Result<Self, FilterError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| FilterError::Initialization(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| map_redis_error("failed to connect to redis", e))?;
        Self::new(conn, config).await
    }

    /// Returns the Redis key that holds the filter.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl MembershipFilter for RedisMembershipFilter {
    async fn add(&self, code: &ShortCode) -> Result<(), FilterError> {
        trace!(code = %code, namespace = %self.namespace, "adding code to redis bloom filter");

        let mut conn = self.conn.clone();
        // BF.ADD answers 0 when the code may already be present; both mean success.
        let _newly_added: bool = redis::cmd("BF.ADD")
            .arg(&self.namespace)
            .arg(code.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(code = %code, error = %e, "failed to add code to redis bloom filter");
                map_redis_error("BF.ADD failed", e)
            })?;
        Ok(())
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool, FilterError> {
        let mut conn = self.conn.clone();
        redis::cmd("BF.EXISTS")
            .arg(&self.namespace)
            .arg(code.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(code = %code, error = %e, "failed to check code in redis bloom filter");
                map_redis_error("BF.EXISTS failed", e)
            })
    }
}
