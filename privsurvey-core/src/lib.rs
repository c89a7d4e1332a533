//! Core pipeline for privsurvey.
//!
//! privsurvey classifies every column of a database schema into a fixed set
//! of privacy-data categories. Deterministic rules resolve what they can; the
//! remaining columns are deduplicated by fingerprint, checked against a
//! persistent cache, and sent in bounded batches to a remote AI classifier.
//!
//! # Data Handling Guarantees
//! - Only column names, declared types and sample shape digests leave the host
//! - Raw sample values are reduced to a digest as soon as they are read
//! - API keys and database passwords are never logged or serialized
//! - Schema readers are read-only
//!
//! # Architecture
//! - [`schema`]: readers producing the normalized [`SchemaModel`]
//! - [`classification`]: rule engine, cache, remote adapter and aggregator
//! - [`report`]: the report handed to output sinks
//! - [`validation`]: JSON Schema and credential checks for reports

pub mod classification;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod report;
pub mod schema;
pub mod validation;

// Re-export commonly used types
pub use classification::{
    Aggregator, ClassificationCache, ClassificationResult, ClassifierAdapter, Confidence,
    DisabledClassifier, FileCache, Fingerprint, GeminiClassifier, PrivacyCategory,
    RemoteClassifier, RuleEngine,
};
pub use config::{
    CacheConfig, ClassifierConfig, PrivSurveyConfig, RetryConfig, RulesConfig, SamplingConfig,
};
pub use error::{CacheError, ClassifierError, PrivSurveyError, Result, RuleEngineError};
pub use models::{ColumnDescriptor, ColumnId, RawColumn, RawTable, SampleDigest, SchemaModel};
pub use report::{Report, ReportSummary};
pub use schema::{SchemaReader, create_reader};
pub use validation::{
    ValidationError, initialize_report_validator, validate_and_parse_report,
    validate_report_output,
};
