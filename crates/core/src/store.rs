//! Persistent-store seam used by a scan cycle, plus its SQLite implementation.

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::models::{FileRecord, FileTypeRule};
use chrono::SecondsFormat;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

#[async_trait::async_trait]
pub trait IntakeStore: Send + Sync {
    /// All rows of the rule table. The outer error means the query itself
    /// failed; an inner error means that single row could not be decoded.
    async fn type_rule_rows(&self) -> Result<Vec<Result<FileTypeRule, StoreError>>, StoreError>;

    async fn count_files_with_path(&self, path: &str) -> Result<i64, StoreError>;

    async fn insert_file(&self, record: &FileRecord) -> Result<(), StoreError>;

    /// Points `prefix` (case-insensitive) at `type_id`, adding the rule if it
    /// is new. Returns true when a row was inserted.
    async fn upsert_type_rule(&self, rule: &FileTypeRule) -> Result<bool, StoreError>;
}

pub struct SqliteIntakeStore {
    pool: SqlitePool,
    rule_table: String,
    file_table: String,
}

impl SqliteIntakeStore {
    pub fn new(pool: SqlitePool, rule_table: &str, file_table: &str) -> Self {
        Self {
            pool,
            rule_table: rule_table.to_string(),
            file_table: file_table.to_string(),
        }
    }

    /// Table names must already have passed `AppConfig::validate`.
    pub fn from_config(pool: SqlitePool, cfg: &DatabaseConfig) -> Self {
        Self::new(pool, &cfg.rule_table, &cfg.file_table)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl IntakeStore for SqliteIntakeStore {
    async fn type_rule_rows(&self) -> Result<Vec<Result<FileTypeRule, StoreError>>, StoreError> {
        // SQLite columns are dynamically typed; check storage classes before decoding.
        let sql = format!(
            "SELECT prefix, id, typeof(prefix) AS prefix_type, typeof(id) AS id_type FROM {}",
            self.rule_table
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(decode_rule_row).collect())
    }

    async fn count_files_with_path(&self, path: &str) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(1) FROM {} WHERE path = ?1", self.file_table);
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(path)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_file(&self, record: &FileRecord) -> Result<(), StoreError> {
        let size = i64::try_from(record.size)
            .map_err(|_| StoreError::Other(format!("size {} out of range", record.size)))?;
        let sql = format!(
            "INSERT INTO {} (name, path, size, mod_time, type_id) VALUES (?1, ?2, ?3, ?4, ?5)",
            self.file_table
        );
        sqlx::query(&sql)
            .bind(&record.name)
            .bind(&record.path)
            .bind(size)
            .bind(record.mod_time.to_rfc3339_opts(SecondsFormat::Secs, true))
            .bind(record.type_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_type_rule(&self, rule: &FileTypeRule) -> Result<bool, StoreError> {
        let update = format!(
            "UPDATE {} SET id = ?1 WHERE lower(prefix) = lower(?2)",
            self.rule_table
        );
        let res = sqlx::query(&update)
            .bind(rule.type_id)
            .bind(&rule.prefix)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() > 0 {
            return Ok(false);
        }
        let insert = format!("INSERT INTO {} (id, prefix) VALUES (?1, ?2)", self.rule_table);
        sqlx::query(&insert)
            .bind(rule.type_id)
            .bind(&rule.prefix)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }
}

fn decode_rule_row(row: &SqliteRow) -> Result<FileTypeRule, StoreError> {
    let prefix_type: String = row.try_get("prefix_type")?;
    let id_type: String = row.try_get("id_type")?;
    if prefix_type != "text" {
        return Err(StoreError::MalformedRow(format!(
            "prefix has type {prefix_type}, expected text"
        )));
    }
    if id_type != "integer" {
        return Err(StoreError::MalformedRow(format!(
            "id has type {id_type}, expected integer"
        )));
    }
    Ok(FileTypeRule {
        prefix: row.try_get("prefix")?,
        type_id: row.try_get("id")?,
    })
}
