use crate::sql::{is_unique_violation, map_sqlx_error, timestamp_from_millis};
use async_trait::async_trait;
use burrow_core::repository::Result;
use burrow_core::{AliasRecord, AliasStore, ShortCode, StorageError};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, trace};

/// Schema for the `alias_records` table.
pub const SCHEMA: &str = include_str!("../ddl/postgres/alias_records.sql");

/// PostgreSQL implementation of the [`AliasStore`] contract.
///
/// Reads go to the `reader` pool and writes to the `writer` pool, which may
/// point at a replica and a primary. A read that misses on the reader is
/// repeated on the writer, so a record inserted through this store is
/// visible to the next lookup even while the replica lags. Timestamps are
/// stored as milliseconds since the Unix epoch.
#[derive(Debug, Clone)]
pub struct PostgresAliasStore {
    reader: PgPool,
    writer: PgPool,
    split: bool,
}

impl PostgresAliasStore {
    /// Creates a store that reads and writes through the same pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            reader: pool.clone(),
            writer: pool,
            split: false,
        }
    }

    /// Creates a store with separate read and write pools.
    pub fn with_read_write_split(reader: PgPool, writer: PgPool) -> Self {
        Self {
            reader,
            writer,
            split: true,
        }
    }

    /// Opens pools for the given DSNs. Without a read DSN both roles share
    /// the write pool.
    pub async fn connect(write_url: &str, read_url: Option<&str>) -> Result<Self> {
        let writer = PgPool::connect(write_url).await.map_err(map_sqlx_error)?;
        match read_url {
            Some(url) if url != write_url => {
                let reader = PgPool::connect(url).await.map_err(map_sqlx_error)?;
                Ok(Self::with_read_write_split(reader, writer))
            }
            _ => Ok(Self::new(writer)),
        }
    }

    /// Creates the `alias_records` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.writer)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Returns the pool used for reads.
    pub fn reader(&self) -> &PgPool {
        &self.reader
    }

    /// Returns the pool used for writes.
    pub fn writer(&self) -> &PgPool {
        &self.writer
    }

    async fn find_in(&self, pool: &PgPool, code: &ShortCode) -> Result<Option<AliasRecord>> {
        let row = sqlx::query(
            r#"
            SELECT code, target, created_at, expires_at
            FROM alias_records
            WHERE code = $1
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|row| decode_record(&row)).transpose()
    }
}

fn decode_record(row: &PgRow) -> Result<AliasRecord> {
    let code: String = row.try_get("code").map_err(map_sqlx_error)?;
    let target: String = row.try_get("target").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
    let expires_at: i64 = row.try_get("expires_at").map_err(map_sqlx_error)?;

    Ok(AliasRecord {
        code: ShortCode::new_unchecked(code),
        target,
        created_at: timestamp_from_millis("created_at", created_at)?,
        expires_at: timestamp_from_millis("expires_at", expires_at)?,
    })
}

#[async_trait]
impl AliasStore for PostgresAliasStore {
    async fn insert(&self, record: &AliasRecord) -> Result<()> {
        trace!(code = %record.code, "inserting alias record");

        let result = sqlx::query(
            r#"
            INSERT INTO alias_records (code, target, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.code.as_str())
        .bind(&record.target)
        .bind(record.created_at.as_millisecond())
        .bind(record.expires_at.as_millisecond())
        .execute(&self.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::Conflict(record.code.to_string()))
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn find_by_code(&self, code: &ShortCode) -> Result<Option<AliasRecord>> {
        if let Some(record) = self.find_in(&self.reader, code).await? {
            return Ok(Some(record));
        }

        if !self.split {
            return Ok(None);
        }

        debug!(code = %code, "reader missed, retrying lookup on writer");
        self.find_in(&self.writer, code).await
    }

    async fn list_codes(&self, after: Option<&ShortCode>, limit: usize) -> Result<Vec<ShortCode>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query(
            r#"
            SELECT code
            FROM alias_records
            WHERE $1::TEXT IS NULL OR code > $1
            ORDER BY code
            LIMIT $2
            "#,
        )
        .bind(after.map(ShortCode::as_str))
        .bind(limit)
        .fetch_all(&self.reader)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("code")
                    .map(ShortCode::new_unchecked)
                    .map_err(map_sqlx_error)
            })
            .collect()
    }
}
