//! Reader for JSON schema files.
//!
//! The file layout is
//! `{ "database_name": "...", "tables": [{ "name": "...", "columns": [...] }] }`
//! where each column carries `name`, `type` and optionally `is_nullable`,
//! `ordinal_position`, `sample_digest` or `sample_values`.

use super::SchemaReader;
use crate::error::{PrivSurveyError, Result};
use crate::models::{RawTable, SchemaModel};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    database_name: Option<String>,
    #[serde(default)]
    tables: Vec<RawTable>,
}

/// Reads a schema description from a JSON file.
#[derive(Debug, Clone)]
pub struct JsonSchemaReader {
    path: PathBuf,
}

impl JsonSchemaReader {
    /// Creates a reader for the file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Parses schema JSON without touching the filesystem.
    ///
    /// `fallback_name` is used when the document has no `database_name`.
    ///
    /// # Errors
    /// Returns a serialization error if the JSON does not match the layout.
    pub fn parse(content: &str, fallback_name: &str) -> Result<SchemaModel> {
        let file: SchemaFile =
            serde_json::from_str(content).map_err(|e| PrivSurveyError::Serialization {
                context: "Failed to parse schema file".to_string(),
                source: e,
            })?;

        let database_name = file
            .database_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| fallback_name.to_string());
        Ok(SchemaModel::from_raw(database_name, file.tables))
    }

    fn fallback_name(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "schema".to_string())
    }
}

#[async_trait]
impl SchemaReader for JsonSchemaReader {
    async fn read_schema(&self) -> Result<SchemaModel> {
        tracing::info!("Reading schema file {}", self.path.display());
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PrivSurveyError::io(
                format!("Failed to read schema file {}", self.path.display()),
                e,
            )
        })?;

        let schema = Self::parse(&content, &self.fallback_name())?;
        tracing::info!(
            "Loaded {} tables with {} columns from {}",
            schema.tables().len(),
            schema.column_count(),
            self.path.display()
        );
        Ok(schema)
    }

    fn source_description(&self) -> String {
        format!("JSON schema file {}", self.path.display())
    }
}
