//! Schema Model: tables and columns extracted from a database.
//!
//! Schema readers hand over [`RawTable`]s exactly as the database reported
//! them; [`SchemaModel::from_raw`] normalizes them into immutable
//! [`ColumnDescriptor`]s. Sample values never reach this module: readers
//! reduce them to a [`SampleDigest`] first.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Maximum characters of a sample value considered when computing its shape.
const MAX_SHAPE_LEN: usize = 64;

/// Identity of a column within one database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId {
    pub table: String,
    pub column: String,
}

impl ColumnId {
    /// Creates a new column identity.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl std::fmt::Display for ColumnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Hash over the shapes of a bounded set of sample values.
///
/// Each value is reduced to a shape (ASCII digits become `9`, letters become
/// `a`, whitespace becomes a space, anything else is kept) before hashing, so
/// neither the digest nor anything derived from it carries raw data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleDigest(String);

impl SampleDigest {
    /// Wraps an already computed digest string.
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Computes a digest from sample values; `None` when no value is non-empty.
    pub fn from_values<I, S>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let shapes: BTreeSet<String> = values
            .into_iter()
            .map(|v| value_shape(v.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();

        if shapes.is_empty() {
            return None;
        }

        let mut hasher = Sha256::new();
        for shape in &shapes {
            hasher.update(shape.as_bytes());
            hasher.update(b"\n");
        }
        Some(Self(format!("{:x}", hasher.finalize())))
    }

    /// Returns the digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reduces a sample value to its character-class shape.
pub fn value_shape(value: &str) -> String {
    value
        .trim()
        .chars()
        .take(MAX_SHAPE_LEN)
        .map(|c| {
            if c.is_ascii_digit() {
                '9'
            } else if c.is_alphabetic() {
                'a'
            } else if c.is_whitespace() {
                ' '
            } else {
                c
            }
        })
        .collect()
}

/// Normalizes a column name for matching and fingerprinting.
///
/// Trims whitespace, strips identifier quoting (`"`, `` ` ``, `[`, `]`) and
/// lowercases.
pub fn normalize_column_name(name: &str) -> String {
    name.trim()
        .trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'))
        .trim()
        .to_lowercase()
}

/// Normalizes a declared type: lowercase with single spaces.
pub fn normalize_type(declared_type: &str) -> String {
    declared_type
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Immutable description of one extracted column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    id: ColumnId,
    declared_type: String,
    is_nullable: bool,
    ordinal_position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sample_digest: Option<SampleDigest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    is_primary_key: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    is_unique: bool,
}

impl ColumnDescriptor {
    /// Creates a new column descriptor.
    pub fn new(
        id: ColumnId,
        declared_type: impl Into<String>,
        is_nullable: bool,
        ordinal_position: u32,
        sample_digest: Option<SampleDigest>,
    ) -> Self {
        Self {
            id,
            declared_type: declared_type.into(),
            is_nullable,
            ordinal_position,
            sample_digest,
            comment: None,
            is_primary_key: false,
            is_unique: false,
        }
    }

    /// Builder method to attach the database's column comment.
    ///
    /// Blank comments are treated as absent.
    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        self
    }

    /// Builder method to set key flags; a primary key is always unique.
    pub fn with_key_flags(mut self, is_primary_key: bool, is_unique: bool) -> Self {
        self.is_primary_key = is_primary_key;
        self.is_unique = is_unique || is_primary_key;
        self
    }

    /// Column identity.
    pub fn id(&self) -> &ColumnId {
        &self.id
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.id.table
    }

    /// Column name as reported by the database.
    pub fn name(&self) -> &str {
        &self.id.column
    }

    /// Normalized column name used by rules and fingerprints.
    pub fn normalized_name(&self) -> String {
        normalize_column_name(&self.id.column)
    }

    /// Declared type as reported by the database.
    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    /// Normalized declared type used by rules and fingerprints.
    pub fn normalized_type(&self) -> String {
        normalize_type(&self.declared_type)
    }

    /// Whether the column accepts NULL.
    pub fn is_nullable(&self) -> bool {
        self.is_nullable
    }

    /// 1-based position within its table.
    pub fn ordinal_position(&self) -> u32 {
        self.ordinal_position
    }

    /// Digest of sample value shapes, if sampling was performed.
    pub fn sample_digest(&self) -> Option<&SampleDigest> {
        self.sample_digest.as_ref()
    }

    /// Column comment from the database catalog.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Part of the primary key.
    pub fn is_primary_key(&self) -> bool {
        self.is_primary_key
    }

    /// Covered by a primary key or single-column unique constraint.
    pub fn is_unique(&self) -> bool {
        self.is_unique
    }
}

/// Column metadata as supplied by a schema reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawColumn {
    pub name: String,
    #[serde(alias = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub is_nullable: bool,
    #[serde(default)]
    pub ordinal_position: Option<u32>,
    #[serde(default)]
    pub sample_digest: Option<String>,
    /// Sample values; reduced to a digest during normalization and dropped
    #[serde(default, skip_serializing)]
    pub sample_values: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_unique: bool,
}

fn default_nullable() -> bool {
    true
}

impl RawColumn {
    /// Creates a raw column with no sample information.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            ordinal_position: None,
            sample_digest: None,
            sample_values: Vec::new(),
            comment: None,
            is_primary_key: false,
            is_unique: false,
        }
    }

    /// Builder method to set nullability.
    pub fn with_nullable(mut self, is_nullable: bool) -> Self {
        self.is_nullable = is_nullable;
        self
    }

    /// Builder method to set the ordinal position.
    pub fn with_ordinal_position(mut self, position: u32) -> Self {
        self.ordinal_position = Some(position);
        self
    }

    /// Builder method to set a precomputed sample digest.
    pub fn with_sample_digest(mut self, digest: impl Into<String>) -> Self {
        self.sample_digest = Some(digest.into());
        self
    }

    /// Builder method to attach sample values.
    pub fn with_sample_values(mut self, values: Vec<String>) -> Self {
        self.sample_values = values;
        self
    }

    /// Builder method to set the column comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Builder method to set key flags.
    pub fn with_keys(mut self, is_primary_key: bool, is_unique: bool) -> Self {
        self.is_primary_key = is_primary_key;
        self.is_unique = is_unique;
        self
    }
}

/// Table metadata as supplied by a schema reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTable {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<RawColumn>,
}

impl RawTable {
    /// Creates a raw table.
    pub fn new(name: impl Into<String>, columns: Vec<RawColumn>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }
}

/// One table of the normalized Schema Model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// Normalized, read-only schema of one database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaModel {
    database_name: String,
    tables: Vec<TableSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

impl SchemaModel {
    /// Normalizes reader output into a Schema Model.
    ///
    /// Table and column order is preserved. Tables or columns with empty names
    /// are dropped, a table reported twice is merged into its first occurrence,
    /// and a duplicate column identity keeps its first occurrence. Each such
    /// correction is recorded as a warning.
    pub fn from_raw(database_name: impl Into<String>, raw_tables: Vec<RawTable>) -> Self {
        let mut warnings = Vec::new();
        let mut tables: Vec<TableSchema> = Vec::new();
        let mut table_index: HashMap<String, usize> = HashMap::new();
        let mut seen: HashSet<ColumnId> = HashSet::new();

        for raw_table in raw_tables {
            let table_name = raw_table.name.trim().to_string();
            if table_name.is_empty() {
                warnings.push("Skipped table with empty name".to_string());
                continue;
            }

            let index = match table_index.get(&table_name) {
                Some(index) => {
                    warnings.push(format!(
                        "Table '{}' reported more than once; columns merged",
                        table_name
                    ));
                    *index
                }
                None => {
                    tables.push(TableSchema {
                        name: table_name.clone(),
                        columns: Vec::new(),
                    });
                    let index = tables.len().saturating_sub(1);
                    table_index.insert(table_name.clone(), index);
                    index
                }
            };

            for (position, raw_column) in raw_table.columns.into_iter().enumerate() {
                let column_name = raw_column.name.trim().to_string();
                if column_name.is_empty() {
                    warnings.push(format!(
                        "Skipped column with empty name in table '{}'",
                        table_name
                    ));
                    continue;
                }

                let id = ColumnId::new(table_name.clone(), column_name);
                if !seen.insert(id.clone()) {
                    warnings.push(format!("Duplicate column '{}' ignored", id));
                    continue;
                }

                let digest = raw_column
                    .sample_digest
                    .filter(|d| !d.trim().is_empty())
                    .map(SampleDigest::new)
                    .or_else(|| SampleDigest::from_values(&raw_column.sample_values));

                let ordinal = raw_column
                    .ordinal_position
                    .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX).saturating_add(1));

                if let Some(table) = tables.get_mut(index) {
                    table.columns.push(
                        ColumnDescriptor::new(
                            id,
                            raw_column.data_type.trim(),
                            raw_column.is_nullable,
                            ordinal,
                            digest,
                        )
                        .with_comment(raw_column.comment)
                        .with_key_flags(raw_column.is_primary_key, raw_column.is_unique),
                    );
                }
            }
        }

        for warning in &warnings {
            tracing::warn!("{}", warning);
        }

        Self {
            database_name: database_name.into(),
            tables,
            warnings,
        }
    }

    /// Name of the surveyed database.
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Tables in extraction order.
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Iterates over all columns in table/column order.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.tables.iter().flat_map(|t| t.columns.iter())
    }

    /// Total number of columns.
    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }

    /// Normalization warnings.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}
