//! MySQL schema reader backed by `INFORMATION_SCHEMA`.
//!
//! Text columns are cast to CHAR to avoid VARBINARY decoding issues on
//! MySQL 8.0+.

use super::SchemaReader;
use crate::config::SamplingConfig;
use crate::error::{PrivSurveyError, Result, redact_database_url};
use crate::models::{RawColumn, RawTable, SampleDigest, SchemaModel};
use async_trait::async_trait;
use sqlx::MySqlPool;
use sqlx::Row;
use sqlx::mysql::MySqlPoolOptions;
use std::time::Duration;

/// Reads schema metadata from one MySQL database.
#[derive(Debug, Clone)]
pub struct MySqlSchemaReader {
    pool: MySqlPool,
    database_name: String,
    redacted_url: String,
    sampling: SamplingConfig,
}

impl MySqlSchemaReader {
    /// Connects to the database named in the URL path.
    ///
    /// # Errors
    /// Returns an error if the URL names no database or the connection fails.
    /// Error messages never contain the password.
    pub async fn connect(connection_string: &str, sampling: SamplingConfig) -> Result<Self> {
        let redacted_url = redact_database_url(connection_string);
        let database_name = database_name_from(connection_string).ok_or_else(|| {
            PrivSurveyError::configuration(format!(
                "MySQL URL must name a database: {}",
                redacted_url
            ))
        })?;

        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(sampling.query_timeout_secs.max(1)))
            .connect(connection_string)
            .await
            .map_err(|e| {
                PrivSurveyError::schema_read(
                    format!("Failed to connect to {}", redacted_url),
                    e,
                )
            })?;

        Ok(Self {
            pool,
            database_name,
            redacted_url,
            sampling,
        })
    }

    async fn collect_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT CAST(TABLE_NAME AS CHAR) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ?
            AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#,
        )
        .bind(&self.database_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PrivSurveyError::schema_read("Failed to enumerate tables", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("TABLE_NAME")
                    .map_err(|e| PrivSurveyError::parse_field("TABLE_NAME", None, e))
            })
            .collect()
    }

    async fn collect_columns(&self, table: &str) -> Result<Vec<RawColumn>> {
        let rows = sqlx::query(
            r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR) AS COLUMN_NAME,
                CAST(COLUMN_TYPE AS CHAR) AS COLUMN_TYPE,
                CAST(IS_NULLABLE AS CHAR) AS IS_NULLABLE,
                CAST(ORDINAL_POSITION AS SIGNED) AS ORDINAL_POSITION,
                CAST(COLUMN_KEY AS CHAR) AS COLUMN_KEY,
                CAST(COLUMN_COMMENT AS CHAR) AS COLUMN_COMMENT
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ?
            AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#,
        )
        .bind(&self.database_name)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            PrivSurveyError::schema_read(
                format!("Failed to collect columns for table '{}'", table),
                e,
            )
        })?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row
                .try_get("COLUMN_NAME")
                .map_err(|e| PrivSurveyError::parse_field("COLUMN_NAME", Some(table), e))?;
            let column_type: String = row.try_get("COLUMN_TYPE").unwrap_or_default();
            let is_nullable: String = row.try_get("IS_NULLABLE").unwrap_or_default();
            let ordinal: i64 = row.try_get("ORDINAL_POSITION").unwrap_or(0);
            let column_key: String = row.try_get("COLUMN_KEY").unwrap_or_default();
            let comment: String = row.try_get("COLUMN_COMMENT").unwrap_or_default();
            let (is_primary_key, is_unique) = key_flags(&column_key);

            let mut column = RawColumn::new(name, column_type)
                .with_nullable(is_nullable.eq_ignore_ascii_case("YES"))
                .with_keys(is_primary_key, is_unique);
            if !comment.trim().is_empty() {
                column = column.with_comment(comment);
            }
            if let Ok(position) = u32::try_from(ordinal)
                && position > 0
            {
                column = column.with_ordinal_position(position);
            }
            if let Some(digest) = self.sample_digest(table, &column.name).await {
                column = column.with_sample_digest(digest.as_str());
            }
            columns.push(column);
        }
        Ok(columns)
    }

    async fn sample_digest(&self, table: &str, column: &str) -> Option<SampleDigest> {
        if !self.sampling.is_enabled() {
            return None;
        }

        let quoted = quote_identifier(column);
        let query = format!(
            "SELECT CAST({col} AS CHAR) FROM {table} WHERE {col} IS NOT NULL LIMIT ?",
            col = quoted,
            table = quote_identifier(table),
        );
        let fetch = sqlx::query_scalar::<_, Option<String>>(&query)
            .bind(u64::from(self.sampling.sample_size))
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
impl SchemaReader for MySqlSchemaReader {
    async fn read_schema(&self) -> Result<SchemaModel> {
        let start_time = std::time::Instant::now();
        tracing::info!("Starting MySQL schema read for {}", self.redacted_url);

        let table_names = self.collect_tables().await?;
        let mut tables = Vec::with_capacity(table_names.len());
        for name in table_names {
            let columns = self.collect_columns(&name).await?;
            tables.push(RawTable::new(name, columns));
        }

        let schema = SchemaModel::from_raw(self.database_name.clone(), tables);
        tracing::info!(
            "MySQL schema read completed in {:.2}s - found {} tables, {} columns",
            start_time.elapsed().as_secs_f64(),
            schema.tables().len(),
            schema.column_count()
        );
        Ok(schema)
    }

    fn source_description(&self) -> String {
        format!("MySQL database {}", self.redacted_url)
    }
}

/// Quotes a MySQL identifier with backticks.
pub(crate) fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

/// Maps `COLUMN_KEY` (`PRI`, `UNI`, `MUL` or empty) to primary/unique flags.
fn key_flags(column_key: &str) -> (bool, bool) {
    match column_key.trim().to_ascii_uppercase().as_str() {
        "PRI" => (true, true),
        "UNI" => (false, true),
        _ => (false, false),
    }
}

fn database_name_from(connection_string: &str) -> Option<String> {
    let url = url::Url::parse(connection_string).ok()?;
    let name = url.path().trim_matches('/');
    (!name.is_empty()).then(|| name.to_string())
}
