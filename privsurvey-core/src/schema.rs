//! Schema readers.
//!
//! A reader turns a source (a JSON schema file or a database URL) into the
//! normalized [`SchemaModel`]. Database readers are read-only and reduce any
//! sampled values to a [`crate::models::SampleDigest`] as soon as they are
//! fetched.

use crate::config::SamplingConfig;
use crate::error::{PrivSurveyError, Result};
use crate::models::SchemaModel;
use async_trait::async_trait;

pub mod json;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use json::JsonSchemaReader;
#[cfg(feature = "mysql")]
pub use mysql::MySqlSchemaReader;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSchemaReader;

/// Source of schema metadata.
///
/// # Security
/// - Database readers only issue SELECT and PRAGMA statements
/// - `source_description` never contains a password
#[async_trait]
pub trait SchemaReader: Send + Sync {
    /// Reads and normalizes the full schema.
    ///
    /// # Errors
    /// Returns [`PrivSurveyError::SchemaRead`] (or an I/O error for files) if
    /// the metadata cannot be read. Sampling failures are not errors; the
    /// affected column simply has no digest.
    async fn read_schema(&self) -> Result<SchemaModel>;

    /// Human-readable, credential-free description of the source.
    fn source_description(&self) -> String;
}

/// Kinds of schema source recognized by [`create_reader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// `*.json` schema file
    Json,
    /// `sqlite:` URL or a `.db`/`.sqlite`/`.sqlite3` path
    Sqlite,
    /// `mysql://` URL
    MySql,
}

impl SourceKind {
    /// Detects the source kind from its string form.
    ///
    /// # Errors
    /// Returns a configuration error for unrecognized sources.
    pub fn detect(source: &str) -> Result<Self> {
        let lower = source.to_ascii_lowercase();
        if lower.starts_with("mysql://") {
            Ok(Self::MySql)
        } else if lower.starts_with("sqlite:")
            || lower.ends_with(".db")
            || lower.ends_with(".sqlite")
            || lower.ends_with(".sqlite3")
        {
            Ok(Self::Sqlite)
        } else if lower.ends_with(".json") {
            Ok(Self::Json)
        } else {
            Err(PrivSurveyError::configuration(
                "Unrecognized schema source: expected a .json file, a sqlite: URL or a mysql:// URL",
            ))
        }
    }
}

/// Creates the reader for `source`.
///
/// # Errors
/// Returns an error if the source is unrecognized, its reader is not compiled
/// in, or the database cannot be opened.
///
/// # Example
/// ```rust,no_run
/// use privsurvey_core::config::SamplingConfig;
/// use privsurvey_core::schema::create_reader;
///
/// # async fn example() -> privsurvey_core::Result<()> {
/// let reader = create_reader("schema.json", &SamplingConfig::default()).await?;
/// let schema = reader.read_schema().await?;
/// println!("{} columns", schema.column_count());
/// # Ok(())
/// # }
/// ```
pub async fn create_reader(
    source: &str,
    sampling: &SamplingConfig,
) -> Result<Box<dyn SchemaReader>> {
    match SourceKind::detect(source)? {
        SourceKind::Json => Ok(Box::new(JsonSchemaReader::new(source))),
        #[cfg(feature = "sqlite")]
        SourceKind::Sqlite => {
            let reader = SqliteSchemaReader::connect(source, sampling.clone()).await?;
            Ok(Box::new(reader))
        }
        #[cfg(not(feature = "sqlite"))]
        SourceKind::Sqlite => {
            let _ = sampling;
            Err(PrivSurveyError::configuration(
                "SQLite support not compiled in. Use --features sqlite",
            ))
        }
        #[cfg(feature = "mysql")]
        SourceKind::MySql => {
            let reader = MySqlSchemaReader::connect(source, sampling.clone()).await?;
            Ok(Box::new(reader))
        }
        #[cfg(not(feature = "mysql"))]
        SourceKind::MySql => {
            let _ = sampling;
            Err(PrivSurveyError::configuration(
                "MySQL support not compiled in. Use --features mysql",
            ))
        }
    }
}
