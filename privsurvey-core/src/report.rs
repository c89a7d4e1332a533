//! Report handed to report sinks.
//!
//! A report lists every column of the surveyed schema exactly once, in
//! schema order, with its final classification.

use crate::classification::{
    ClassificationResult, ClassificationSource, DegradedBatch, PrivacyCategory,
};
use crate::models::{ColumnDescriptor, ColumnId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Version of the report JSON layout.
pub const REPORT_FORMAT_VERSION: &str = "1.0";

/// Final classification of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnReport {
    /// Column name within its table
    pub column: String,
    /// Type as declared in the database catalog
    pub declared_type: String,
    /// Whether the column accepts NULL
    pub is_nullable: bool,
    /// 1-based position within the table
    pub ordinal_position: u32,
    /// Catalog comment, when the database has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Part of the table's primary key
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_primary_key: bool,
    /// Set for primary keys and single-column unique constraints
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_unique: bool,
    /// Final result after merging rules, cache and AI
    pub classification: ClassificationResult,
    /// Set for `unknown` results so documentation can flag them
    pub needs_review: bool,
}

impl ColumnReport {
    /// Pairs a descriptor with its final result.
    pub fn new(descriptor: &ColumnDescriptor, classification: ClassificationResult) -> Self {
        Self {
            column: descriptor.name().to_string(),
            declared_type: descriptor.declared_type().to_string(),
            is_nullable: descriptor.is_nullable(),
            ordinal_position: descriptor.ordinal_position(),
            comment: descriptor.comment().map(str::to_string),
            is_primary_key: descriptor.is_primary_key(),
            is_unique: descriptor.is_unique(),
            needs_review: classification.is_unknown(),
            classification,
        }
    }
}

/// All columns of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSection {
    /// Table name as read from the source
    pub table_name: String,
    /// Columns in ordinal order
    pub columns: Vec<ColumnReport>,
}

/// Run counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Tables in the report
    pub total_tables: usize,
    /// Columns in the report, each counted once
    pub total_columns: usize,
    /// Column count per category label; every category is present
    pub by_category: BTreeMap<String, usize>,
    /// Columns decided by a deterministic rule
    pub rule_matches: usize,
    /// Columns answered from the classification cache
    pub cache_hits: usize,
    /// Columns the AI classified with a category other than `unknown`
    pub ai_classified: usize,
    /// Columns left `unknown`
    pub needs_review: usize,
    /// Remote classifier calls made, retries included
    pub remote_calls: usize,
    /// Batches that fell back to `unknown` after exhausting retries
    pub degraded_batches: usize,
}

/// Per-run counters collected by the aggregator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    /// Columns resolved from the cache
    pub cache_hits: usize,
    /// Remote classifier calls made, retries included
    pub remote_calls: usize,
}

/// Classification report for one database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Always [`REPORT_FORMAT_VERSION`] for reports built here
    pub format_version: String,
    /// Unique per run
    pub run_id: Uuid,
    /// Database the schema was read from
    pub database_name: String,
    /// Completion time of the run
    pub generated_at: DateTime<Utc>,
    /// Tables in schema order
    pub tables: Vec<TableSection>,
    /// Counters derived from `tables` and the run
    pub summary: ReportSummary,
    /// Batches whose columns fell back to `unknown`
    #[serde(default)]
    pub degraded_batches: Vec<DegradedBatch>,
}

impl Report {
    /// Assembles a report and computes its summary.
    pub fn new(
        database_name: impl Into<String>,
        tables: Vec<TableSection>,
        degraded_batches: Vec<DegradedBatch>,
        counters: RunCounters,
    ) -> Self {
        let summary = summarize(&tables, &degraded_batches, counters);
        Self {
            format_version: REPORT_FORMAT_VERSION.to_string(),
            run_id: Uuid::new_v4(),
            database_name: database_name.into(),
            generated_at: Utc::now(),
            tables,
            summary,
            degraded_batches,
        }
    }

    /// Iterates over all classifications in schema order.
    pub fn results(&self) -> impl Iterator<Item = &ClassificationResult> {
        self.tables
            .iter()
            .flat_map(|t| t.columns.iter().map(|c| &c.classification))
    }

    /// Looks up the classification of one column.
    pub fn result_for(&self, id: &ColumnId) -> Option<&ClassificationResult> {
        self.results().find(|r| r.column() == id)
    }

    /// Number of columns in the report.
    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }

    /// Columns whose classification is `unknown`.
    pub fn needs_review(&self) -> impl Iterator<Item = &ColumnId> {
        self.results()
            .filter(|r| r.is_unknown())
            .map(ClassificationResult::column)
    }
}

fn summarize(
    tables: &[TableSection],
    degraded: &[DegradedBatch],
    counters: RunCounters,
) -> ReportSummary {
    let mut summary = ReportSummary {
        total_tables: tables.len(),
        by_category: PrivacyCategory::ALL
            .iter()
            .map(|c| (c.as_str().to_string(), 0))
            .collect(),
        cache_hits: counters.cache_hits,
        remote_calls: counters.remote_calls,
        degraded_batches: degraded.len(),
        ..ReportSummary::default()
    };

    for column in tables.iter().flat_map(|t| &t.columns) {
        let result = &column.classification;
        summary.total_columns += 1;
        *summary
            .by_category
            .entry(result.category().as_str().to_string())
            .or_default() += 1;
        if column.needs_review {
            summary.needs_review += 1;
        }
        match result.source() {
            ClassificationSource::Rule => summary.rule_matches += 1,
            ClassificationSource::Ai if !result.is_unknown() => summary.ai_classified += 1,
            ClassificationSource::Ai => {}
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::Confidence;

    fn descriptor(name: &str, ty: &str) -> ColumnDescriptor {
        ColumnDescriptor::new(ColumnId::new("users", name), ty, true, 1, None)
    }

    fn sample_report() -> Report {
        let email = descriptor("email", "text");
        let login = descriptor("last_login", "timestamp");
        let nick = descriptor("nickname", "text");
        let columns = vec![
            ColumnReport::new(
                &email,
                ClassificationResult::from_rule(
                    email.id().clone(),
                    PrivacyCategory::DirectIdentifier,
                    Confidence::new(0.95).unwrap(),
                    "email",
                ),
            ),
            ColumnReport::new(&login, ClassificationResult::unknown(login.id().clone())),
            ColumnReport::new(
                &nick,
                ClassificationResult::from_ai(
                    nick.id().clone(),
                    PrivacyCategory::QuasiIdentifier,
                    Confidence::new(0.7).unwrap(),
                    None,
                ),
            ),
        ];
        Report::new(
            "app",
            vec![TableSection {
                table_name: "users".into(),
                columns,
            }],
            Vec::new(),
            RunCounters {
                cache_hits: 1,
                remote_calls: 2,
            },
        )
    }

    #[test]
    fn test_summary_counts() {
        let report = sample_report();
        let summary = &report.summary;
        assert_eq!(summary.total_tables, 1);
        assert_eq!(summary.total_columns, 3);
        assert_eq!(summary.rule_matches, 1);
        assert_eq!(summary.ai_classified, 1);
        assert_eq!(summary.needs_review, 1);
        assert_eq!(summary.by_category["direct_identifier"], 1);
        assert_eq!(summary.by_category["sensitive_attribute"], 0);
        assert_eq!(summary.by_category.len(), PrivacyCategory::ALL.len());
        assert_eq!(summary.remote_calls, 2);
    }

    #[test]
    fn test_lookup_helpers() {
        let report = sample_report();
        assert_eq!(report.column_count(), 3);
        assert_eq!(report.format_version, REPORT_FORMAT_VERSION);
        let review: Vec<&ColumnId> = report.needs_review().collect();
        assert_eq!(review, vec![&ColumnId::new("users", "last_login")]);
        assert_eq!(
            report
                .result_for(&ColumnId::new("users", "email"))
                .unwrap()
                .rule(),
            Some("email")
        );
        assert!(report.result_for(&ColumnId::new("users", "missing")).is_none());
    }

    #[test]
    fn test_report_json_shape() {
        let json = serde_json::to_value(sample_report()).unwrap();
        let column = &json["tables"][0]["columns"][1];
        assert_eq!(column["column"], "last_login");
        assert_eq!(column["needs_review"], true);
        assert_eq!(column["classification"]["category"], "unknown");
        assert_eq!(column["classification"]["source"], "ai");
        assert_eq!(column["classification"]["confidence"], 0.0);
        assert!(column.get("comment").is_none());
        assert!(column.get("is_primary_key").is_none());
    }

    #[test]
    fn test_column_report_carries_catalog_context() {
        let descriptor = ColumnDescriptor::new(ColumnId::new("users", "id"), "int", false, 1, None)
            .with_comment(Some("Surrogate key".to_string()))
            .with_key_flags(true, false);
        let report = ColumnReport::new(&descriptor, ClassificationResult::unknown(descriptor.id().clone()));
        assert_eq!(report.comment.as_deref(), Some("Surrogate key"));
        assert!(report.is_primary_key);
        assert!(report.is_unique);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["comment"], "Surrogate key");
        assert_eq!(json["is_primary_key"], true);
    }
}
