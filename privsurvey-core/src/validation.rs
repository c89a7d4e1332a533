//! JSON Schema validation for the privsurvey report format.
//!
//! Every report is checked against an embedded JSON Schema before a sink
//! writes it, then scanned for anything that looks like a credential or a
//! connection string with an embedded password.
//!
//! # Example
//! ```rust
//! use privsurvey_core::validation::validate_report_output;
//! use serde_json::json;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let report = json!({
//!     "format_version": "1.0",
//!     "run_id": "7f1d3c52-6a43-4c4b-9a39-6f1d8f6f7b10",
//!     "database_name": "app",
//!     "generated_at": "2024-01-15T10:30:00Z",
//!     "tables": [],
//!     "summary": { "total_tables": 0, "total_columns": 0 },
//!     "degraded_batches": []
//! });
//!
//! validate_report_output(&report)?;
//! # Ok(())
//! # }
//! ```

use jsonschema::Validator;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

/// JSON Schema validation errors with field-level reporting
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Schema compilation failed during initialization
    #[error("JSON Schema compilation failed: {message}")]
    SchemaCompilation { message: String },

    /// Validation failed with specific field errors
    #[error("Report validation failed with {error_count} errors: {errors:?}")]
    ValidationFailed {
        error_count: usize,
        errors: Vec<String>,
    },

    /// Unsupported format version detected
    #[error("Unsupported format version '{version}'. Supported versions: {supported:?}")]
    UnsupportedVersion {
        version: String,
        supported: Vec<String>,
    },

    /// Potential credential exposure
    #[error("Security validation failed: {reason}")]
    SecurityViolation { reason: String },

    /// JSON parsing error
    #[error("JSON parsing failed: {source}")]
    JsonParsing {
        #[from]
        source: serde_json::Error,
    },
}

/// Supported report format versions
const SUPPORTED_VERSIONS: &[&str] = &[crate::report::REPORT_FORMAT_VERSION];

/// Embedded JSON Schema for the v1.0 report
const REPORT_SCHEMA_V1_0: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "privsurvey Classification Report v1.0",
  "type": "object",
  "required": ["format_version", "run_id", "database_name", "generated_at", "tables", "summary"],
  "properties": {
    "format_version": { "type": "string", "pattern": "^1\\.0$" },
    "run_id": { "type": "string", "minLength": 1 },
    "database_name": { "type": "string" },
    "generated_at": { "type": "string", "format": "date-time" },
    "tables": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["table_name", "columns"],
        "properties": {
          "table_name": { "type": "string", "minLength": 1 },
          "columns": {
            "type": "array",
            "items": { "$ref": "#/$defs/column" }
          }
        }
      }
    },
    "summary": {
      "type": "object",
      "required": ["total_tables", "total_columns"],
      "properties": {
        "total_tables": { "type": "integer", "minimum": 0 },
        "total_columns": { "type": "integer", "minimum": 0 },
        "by_category": {
          "type": "object",
          "additionalProperties": { "type": "integer", "minimum": 0 }
        }
      }
    },
    "degraded_batches": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["batch", "columns", "reason"],
        "properties": {
          "batch": { "type": "integer", "minimum": 0 },
          "columns": { "type": "array", "items": { "$ref": "#/$defs/column_id" } },
          "reason": { "type": "string" },
          "attempts": { "type": "integer", "minimum": 0 }
        }
      }
    }
  },
  "$defs": {
    "column_id": {
      "type": "object",
      "required": ["table", "column"],
      "properties": {
        "table": { "type": "string", "minLength": 1 },
        "column": { "type": "string", "minLength": 1 }
      }
    },
    "column": {
      "type": "object",
      "required": ["column", "classification", "needs_review"],
      "properties": {
        "column": { "type": "string", "minLength": 1 },
        "declared_type": { "type": "string" },
        "is_nullable": { "type": "boolean" },
        "ordinal_position": { "type": "integer", "minimum": 0 },
        "comment": { "type": "string" },
        "is_primary_key": { "type": "boolean" },
        "is_unique": { "type": "boolean" },
        "needs_review": { "type": "boolean" },
        "classification": {
          "type": "object",
          "required": ["column", "category", "confidence", "source"],
          "properties": {
            "column": { "$ref": "#/$defs/column_id" },
            "category": {
              "enum": [
                "direct_identifier",
                "quasi_identifier",
                "sensitive_attribute",
                "non_personal",
                "unknown"
              ]
            },
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
            "source": { "enum": ["rule", "ai"] },
            "rule": { "type": "string" },
            "annotations": {
              "type": "object",
              "properties": {
                "description": { "type": "string" },
                "requirement": { "enum": ["required", "optional"] },
                "collection_method": {
                  "enum": [
                    "user_provided",
                    "user_usage_generated",
                    "system_usage_generated",
                    "system_set",
                    "third_party"
                  ]
                },
                "data_source": {
                  "enum": ["all", "visitors", "registered_users", "third_party"]
                },
                "purpose": { "type": "string" },
                "legal_basis": { "type": "string" },
                "personal_data": { "type": "boolean" },
                "personal_information": { "type": "boolean" }
              }
            }
          }
        }
      }
    }
  }
}"##;

/// Compiled JSON Schema instance (initialized once)
static COMPILED_SCHEMA: OnceLock<Validator> = OnceLock::new();

/// Credential assignments such as `password=...` inside string values
static CREDENTIAL_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

/// Connection URLs carrying a password
static CONNECTION_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

/// Initialize and compile the report JSON Schema.
///
/// Safe to call repeatedly; the compiled schema is cached.
///
/// # Errors
/// Returns `ValidationError::SchemaCompilation` if the embedded schema is invalid.
pub fn initialize_report_validator() -> Result<(), ValidationError> {
    if COMPILED_SCHEMA.get().is_some() {
        return Ok(());
    }

    let schema_json = get_schema_definition()?;
    let compiled = jsonschema::validator_for(&schema_json).map_err(|e| {
        ValidationError::SchemaCompilation {
            message: format!("Schema compilation error: {}", e),
        }
    })?;

    // Another thread may have won the race; either instance is fine
    let _ = COMPILED_SCHEMA.set(compiled);
    Ok(())
}

/// Validate a report's JSON form.
///
/// Checks format version compatibility, JSON Schema structure and the
/// credential scan, in that order.
///
/// # Errors
/// Returns the first failing check.
pub fn validate_report_output(json_value: &Value) -> Result<(), ValidationError> {
    initialize_report_validator()?;
    let schema = COMPILED_SCHEMA
        .get()
        .ok_or_else(|| ValidationError::SchemaCompilation {
            message: "Report validator not initialized".to_string(),
        })?;

    validate_format_version(json_value)?;

    let errors: Vec<String> = schema
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ValidationError::ValidationFailed {
            error_count: errors.len(),
            errors,
        });
    }

    validate_no_credentials_recursive(json_value, "", true)
}

fn validate_format_version(json_value: &Value) -> Result<(), ValidationError> {
    let version = json_value
        .get("format_version")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ValidationError::ValidationFailed {
            error_count: 1,
            errors: vec!["Missing required field 'format_version'".to_string()],
        })?;

    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(ValidationError::UnsupportedVersion {
            version: version.to_string(),
            supported: SUPPORTED_VERSIONS.iter().map(|s| s.to_string()).collect(),
        });
    }

    Ok(())
}

fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Recursively checks keys and string values for credential material.
///
/// Column names such as `password_hash` are legitimate report content, so
/// only key names and `key=value` assignments are treated as violations.
/// Below an `annotations` key the values are generated prose describing the
/// column, so `key=value` assignments are only checked when
/// `check_assignments` is set. Connection URLs are rejected everywhere.
fn validate_no_credentials_recursive(
    value: &Value,
    path: &str,
    check_assignments: bool,
) -> Result<(), ValidationError> {
    match value {
        Value::String(s) => {
            let credential = compiled(
                &CREDENTIAL_PATTERN,
                r"(?i)\b(password|passwd|pwd|secret|token|api_?key)\s*=",
            );
            if check_assignments && credential.is_some_and(|re| re.is_match(s)) {
                return Err(ValidationError::SecurityViolation {
                    reason: format!("Potential credential found at path '{}'", path),
                });
            }

            let connection = compiled(
                &CONNECTION_PATTERN,
                r"(?i)(postgres|postgresql|mysql|mariadb|mongodb|sqlite|sqlserver)://[^\s/@:]*:[^\s/@]*@",
            );
            if connection.is_some_and(|re| re.is_match(s)) {
                return Err(ValidationError::SecurityViolation {
                    reason: format!(
                        "Connection string with password found at path '{}'",
                        path
                    ),
                });
            }
        }
        Value::Object(obj) => {
            for (key, val) in obj {
                let lower_key = key.to_lowercase();
                if ["password", "secret", "token", "credential", "api_key"]
                    .iter()
                    .any(|term| lower_key.contains(term))
                {
                    return Err(ValidationError::SecurityViolation {
                        reason: format!("Credential-related field name found: '{}'", key),
                    });
                }

                let new_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                validate_no_credentials_recursive(
                    val,
                    &new_path,
                    check_assignments && key != "annotations",
                )?;
            }
        }
        Value::Array(arr) => {
            for (index, item) in arr.iter().enumerate() {
                validate_no_credentials_recursive(
                    item,
                    &format!("{}[{}]", path, index),
                    check_assignments,
                )?;
            }
        }
        _ => {}
    }

    Ok(())
}

/// Parses, validates and deserializes a report.
///
/// # Errors
/// Returns validation errors for malformed JSON, schema violations or
/// security issues.
pub fn validate_and_parse_report(json_str: &str) -> Result<crate::report::Report, ValidationError> {
    let json_value: Value = serde_json::from_str(json_str)?;
    validate_report_output(&json_value)?;
    Ok(serde_json::from_value(json_value)?)
}

/// Returns the embedded JSON Schema.
pub fn get_schema_definition() -> Result<Value, ValidationError> {
    serde_json::from_str(REPORT_SCHEMA_V1_0).map_err(|e| ValidationError::SchemaCompilation {
        message: format!("Failed to parse embedded schema: {}", e),
    })
}
