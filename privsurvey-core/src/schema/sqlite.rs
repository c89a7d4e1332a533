//! SQLite schema reader.
//!
//! # SQLite System Tables
//! - `sqlite_master`: lists user tables
//! - `PRAGMA table_info()`: column name, declared type, NOT NULL and primary key flags
//! - `pragma_index_list()` / `pragma_index_info()`: single-column unique indexes
//!
//! The database is opened read-only.

use super::SchemaReader;
use crate::config::SamplingConfig;
use crate::error::{PrivSurveyError, Result};
use crate::models::{RawColumn, RawTable, SampleDigest, SchemaModel};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

/// Reads schema metadata from a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteSchemaReader {
    pool: SqlitePool,
    database_name: String,
    sampling: SamplingConfig,
}

impl SqliteSchemaReader {
    /// Opens the database at `connection_string` in read-only mode.
    ///
    /// Accepts `sqlite://path`, `sqlite:path`, `sqlite::memory:` or a bare
    /// path ending in `.db`, `.sqlite` or `.sqlite3`.
    ///
    /// # Errors
    /// Returns an error if the string is malformed or the file cannot be opened.
    pub async fn connect(connection_string: &str, sampling: SamplingConfig) -> Result<Self> {
        let normalized = normalize_connection_string(connection_string);
        let options = SqliteConnectOptions::from_str(&normalized)
            .map_err(|e| {
                PrivSurveyError::configuration(format!("Invalid SQLite connection string: {}", e))
            })?
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(sampling.query_timeout_secs.max(1)))
            .connect_with(options)
            .await
            .map_err(|e| PrivSurveyError::schema_read("Failed to open SQLite database", e))?;

        Ok(Self::from_pool(
            pool,
            database_name_from(connection_string),
            sampling,
        ))
    }

    /// Wraps an existing pool.
    pub fn from_pool(
        pool: SqlitePool,
        database_name: impl Into<String>,
        sampling: SamplingConfig,
    ) -> Self {
        Self {
            pool,
            database_name: database_name.into(),
            sampling,
        }
    }

    async fn collect_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT name
            FROM sqlite_master
            WHERE type = 'table'
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PrivSurveyError::schema_read("Failed to enumerate tables", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("name")
                    .map_err(|e| PrivSurveyError::parse_field("name", None, e))
            })
            .collect()
    }

    async fn collect_columns(&self, table: &str) -> Result<Vec<RawColumn>> {
        let query = format!("PRAGMA table_info({})", quote_identifier(table));
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                PrivSurveyError::schema_read(
                    format!("Failed to collect columns for table '{}'", table),
                    e,
                )
            })?;

        let unique_columns = self.unique_columns(table).await;
        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row
                .try_get("name")
                .map_err(|e| PrivSurveyError::parse_field("name", Some(table), e))?;
            let declared_type: String = row.try_get("type").unwrap_or_default();
            let not_null: i64 = row.try_get("notnull").unwrap_or(0);
            let cid: i64 = row.try_get("cid").unwrap_or(0);
            let pk: i64 = row.try_get("pk").unwrap_or(0);
            let is_unique = unique_columns.contains(&name);

            let mut column = RawColumn::new(name, declared_type)
                .with_nullable(not_null == 0)
                .with_keys(pk > 0, is_unique)
                .with_ordinal_position(u32::try_from(cid.saturating_add(1)).unwrap_or(u32::MAX));
            if let Some(digest) = self.sample_digest(table, &column.name).await {
                column = column.with_sample_digest(digest.as_str());
            }
            columns.push(column);
        }
        Ok(columns)
    }

    /// Names of columns covered on their own by a unique index.
    async fn unique_columns(&self, table: &str) -> HashSet<String> {
        let rows = sqlx::query_scalar::<_, String>(
            r#"
            SELECT MIN(ii.name)
            FROM pragma_index_list(?1) AS il
            JOIN pragma_index_info(il.name) AS ii
            WHERE il."unique" = 1
            GROUP BY il.name
            HAVING COUNT(*) = 1
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(names) => names.into_iter().collect(),
            Err(e) => {
                tracing::warn!("Reading unique indexes of '{}' failed: {}", table, e);
                HashSet::new()
            }
        }
    }

    /// Reads a bounded sample of one column and reduces it to a digest.
    async fn sample_digest(&self, table: &str, column: &str) -> Option<SampleDigest> {
        if !self.sampling.is_enabled() {
            return None;
        }

        let quoted = quote_identifier(column);
        let query = format!(
            "SELECT CAST({col} AS TEXT) FROM {table} WHERE {col} IS NOT NULL LIMIT ?",
            col = quoted,
            table = quote_identifier(table),
        );
        let fetch = sqlx::query_scalar::<_, Option<String>>(&query)
            .bind(i64::from(self.sampling.sample_size))
            .fetch_all(&self.pool);

        let timeout = Duration::from_secs(self.sampling.query_timeout_secs);
        match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(values)) => SampleDigest::from_values(values.into_iter().flatten()),
            Ok(Err(e)) => {
                tracing::warn!("Sampling {}.{} failed: {}", table, column, e);
                None
            }
            Err(_) => {
                tracing::warn!("Sampling {}.{} timed out", table, column);
                None
            }
        }
    }
}

#[async_trait]
impl SchemaReader for SqliteSchemaReader {
    async fn read_schema(&self) -> Result<SchemaModel> {
        let start_time = std::time::Instant::now();
        tracing::info!(
            "Starting SQLite schema read for database: {}",
            self.database_name
        );

        let table_names = self.collect_tables().await?;
        let mut tables = Vec::with_capacity(table_names.len());
        for name in table_names {
            let columns = self.collect_columns(&name).await?;
            tables.push(RawTable::new(name, columns));
        }

        let schema = SchemaModel::from_raw(self.database_name.clone(), tables);
        tracing::info!(
            "SQLite schema read completed in {:.2}s - found {} tables, {} columns",
            start_time.elapsed().as_secs_f64(),
            schema.tables().len(),
            schema.column_count()
        );
        Ok(schema)
    }

    fn source_description(&self) -> String {
        format!("SQLite database {}", self.database_name)
    }
}

/// Quotes a SQLite identifier, doubling embedded quotes.
pub(crate) fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn normalize_connection_string(connection_string: &str) -> String {
    if connection_string == ":memory:" {
        "sqlite::memory:".to_string()
    } else if connection_string.starts_with("sqlite:") {
        connection_string.to_string()
    } else {
        format!("sqlite://{}", connection_string)
    }
}

fn database_name_from(connection_string: &str) -> String {
    if connection_string.contains(":memory:") {
        return ":memory:".to_string();
    }
    let path = connection_string
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    std::path::Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "main".to_string())
}
