use async_trait::async_trait;
use jiff::Timestamp;
use sha2::{Digest, Sha256};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use tinylink_core::store::Result;
use tinylink_core::{
    ClickOutcome, ConflictField, NewMapping, ReadStore, ShortCode, StorageError, Store,
    UrlMapping,
};
use tracing::debug;
use uuid::Uuid;

/// Name of the unique key on `code`; used to tell the two conflicts apart.
const CODE_UNIQUE_KEY: &str = "uk_url_mappings_code";

const SELECT_COLUMNS: &str = r#"
    SELECT id, code, original_url, created_at, updated_at, expire_at, max_clicks, click_count
    FROM url_mappings
"#;

/// MySQL implementation of the store contract.
///
/// Uniqueness of `original_url` is enforced through a unique key on its
/// SHA-256 digest, since the URL itself is too long for a full-length index.
/// Timestamps are stored as Unix milliseconds.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Creates a store from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a store by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `url_mappings` table if it does not exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(include_str!("../ddl/mysql/url_mappings.sql"))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

fn url_digest(original_url: &str) -> Vec<u8> {
    Sha256::digest(original_url.as_bytes()).to_vec()
}

/// Drops sub-millisecond precision so values survive a round trip unchanged.
fn truncate_to_millis(ts: Timestamp) -> Result<Timestamp> {
    Timestamp::from_millisecond(ts.as_millisecond())
        .map_err(|e| StorageError::InvalidData(format!("timestamp out of range: {e}")))
}

fn parse_timestamp(column: &str, millis: i64) -> Result<Timestamp> {
    Timestamp::from_millisecond(millis).map_err(|e| {
        StorageError::InvalidData(format!("invalid {column} timestamp '{millis}': {e}"))
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn conflict_field(err: &sqlx::Error) -> ConflictField {
    let on_code = err
        .as_database_error()
        .is_some_and(|db| db.message().contains(CODE_UNIQUE_KEY));
    if on_code {
        ConflictField::Code
    } else {
        ConflictField::OriginalUrl
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn row_to_mapping(row: &MySqlRow) -> Result<UrlMapping> {
    let id: String = row.try_get("id").map_err(map_sqlx_error)?;
    let code: String = row.try_get("code").map_err(map_sqlx_error)?;
    let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
    let updated_at: i64 = row.try_get("updated_at").map_err(map_sqlx_error)?;
    let expire_at: Option<i64> = row.try_get("expire_at").map_err(map_sqlx_error)?;
    let max_clicks: Option<u64> = row.try_get("max_clicks").map_err(map_sqlx_error)?;
    let click_count: u64 = row.try_get("click_count").map_err(map_sqlx_error)?;

    Ok(UrlMapping {
        id: Uuid::parse_str(&id)
            .map_err(|e| StorageError::InvalidData(format!("invalid mapping id '{id}': {e}")))?,
        code: ShortCode::new_unchecked(code),
        original_url,
        created_at: parse_timestamp("created_at", created_at)?,
        updated_at: parse_timestamp("updated_at", updated_at)?,
        expire_at: expire_at
            .map(|millis| parse_timestamp("expire_at", millis))
            .transpose()?,
        max_clicks,
        click_count,
    })
}

#[async_trait]
impl ReadStore for MySqlStore {
    async fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlMapping>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE code = ? LIMIT 1"))
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_mapping).transpose()
    }

    async fn find_by_original_url(&self, original_url: &str) -> Result<Option<UrlMapping>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE original_url_sha256 = ? AND original_url = ? LIMIT 1"
        ))
        .bind(url_digest(original_url))
        .bind(original_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_mapping).transpose()
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool> {
        let exists = sqlx::query(
            r#"
            SELECT 1
            FROM url_mappings
            WHERE code = ?
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .is_some();

        Ok(exists)
    }
}

#[async_trait]
impl Store for MySqlStore {
    async fn save(&self, mapping: NewMapping) -> Result<UrlMapping> {
        let now = truncate_to_millis(Timestamp::now())?;
        let mut stored = UrlMapping::from_new(mapping, now);
        stored.expire_at = stored.expire_at.map(truncate_to_millis).transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO url_mappings
                (id, code, original_url, original_url_sha256, created_at, updated_at,
                 expire_at, max_clicks, click_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(stored.id.to_string())
        .bind(stored.code.as_str())
        .bind(&stored.original_url)
        .bind(url_digest(&stored.original_url))
        .bind(stored.created_at.as_millisecond())
        .bind(stored.updated_at.as_millisecond())
        .bind(stored.expire_at.map(|ts| ts.as_millisecond()))
        .bind(stored.max_clicks)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(code = %stored.code, "Inserted url mapping");
                Ok(stored)
            }
            Err(err) if is_unique_violation(&err) => {
                let field = conflict_field(&err);
                let value = match field {
                    ConflictField::Code => stored.code.to_string(),
                    ConflictField::OriginalUrl => stored.original_url,
                };
                Err(StorageError::Conflict { field, value })
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn record_click(&self, code: &ShortCode) -> Result<ClickOutcome> {
        let now = Timestamp::now().as_millisecond();
        let result = sqlx::query(
            r#"
            UPDATE url_mappings
            SET click_count = click_count + 1,
                updated_at = ?
            WHERE code = ?
              AND (max_clicks IS NULL OR click_count < max_clicks)
              AND (expire_at IS NULL OR expire_at > ?)
            "#,
        )
        .bind(now)
        .bind(code.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let current = self.find_by_code(code).await?;
        Ok(match (result.rows_affected(), current) {
            (_, None) => ClickOutcome::Missing,
            (0, Some(mapping)) => {
                debug!(code = %code, "Refused click on expired mapping");
                ClickOutcome::Expired(mapping)
            }
            (_, Some(mapping)) => ClickOutcome::Recorded(mapping),
        })
    }
}
