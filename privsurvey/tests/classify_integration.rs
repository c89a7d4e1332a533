//! End-to-end tests for the classify workflow on JSON schema files.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use privsurvey::ClassifyArgs;
use privsurvey::run;
use privsurvey_core::classification::{
    DisabledClassifier, FeatureTuple, PrivacyCategory, RemoteClassifier, RemoteLabel,
};
use privsurvey_core::config::PrivSurveyConfig;
use privsurvey_core::error::{ClassifierError, PrivSurveyError};
use privsurvey_core::models::ColumnId;
use privsurvey_core::validate_and_parse_report;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

const SCHEMA: &str = r#"{
    "database_name": "crm",
    "tables": [
        {
            "name": "users",
            "columns": [
                { "name": "email", "type": "varchar(255)" },
                { "name": "ssn", "type": "char(11)" },
                { "name": "last_login", "type": "timestamp" }
            ]
        },
        {
            "name": "staff",
            "columns": [
                { "name": "nickname", "type": "text", "sample_digest": "d1" }
            ]
        },
        {
            "name": "customers",
            "columns": [
                { "name": "nickname", "type": "text", "sample_digest": "d1" }
            ]
        }
    ]
}"#;

/// Labels every column `quasi_identifier` and counts calls.
#[derive(Default)]
struct CountingClassifier {
    calls: AtomicUsize,
}

#[async_trait]
impl RemoteClassifier for CountingClassifier {
    async fn classify(&self, batch: &[FeatureTuple]) -> Result<Vec<RemoteLabel>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(batch
            .iter()
            .map(|t| RemoteLabel::new(t.reference.clone(), "quasi_identifier", 0.7))
            .collect())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

fn write_schema(dir: &Path) -> String {
    let path = dir.join("crm.json");
    std::fs::write(&path, SCHEMA).unwrap();
    path.display().to_string()
}

fn setup(dir: &Path, output: &str) -> (ClassifyArgs, PrivSurveyConfig) {
    let mut args = ClassifyArgs::new(write_schema(dir));
    args.output = dir.join(output);
    args.cache_path = Some(dir.join("cache").join("cache.json"));
    let config = run::apply_overrides(PrivSurveyConfig::default(), &args).unwrap();
    (args, config)
}

#[tokio::test]
async fn test_integration_rules_only_run_writes_valid_json() {
    let dir = tempfile::tempdir().unwrap();
    let (args, config) = setup(dir.path(), "report.json");

    let report = run::classify(
        &args,
        &config,
        Arc::new(DisabledClassifier::new("rules-only mode")),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.database_name, "crm");
    assert_eq!(report.column_count(), 5);
    assert_eq!(report.summary.rule_matches, 2);
    assert_eq!(report.summary.needs_review, 3);

    let written = std::fs::read_to_string(&args.output).unwrap();
    let parsed = validate_and_parse_report(&written).unwrap();
    assert_eq!(parsed, report);
}

#[tokio::test]
async fn test_integration_markdown_output() {
    let dir = tempfile::tempdir().unwrap();
    let (args, config) = setup(dir.path(), "report.md");

    run::classify(
        &args,
        &config,
        Arc::new(DisabledClassifier::new("rules-only mode")),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    let markdown = std::fs::read_to_string(&args.output).unwrap();
    assert!(markdown.starts_with("# Privacy classification: crm"));
    assert!(markdown.contains("## staff"));
    assert!(markdown.contains("- `users.last_login`"));
}

#[tokio::test]
async fn test_integration_second_run_uses_cache() {
    let dir = tempfile::tempdir().unwrap();
    let (args, config) = setup(dir.path(), "report.json");

    let first = Arc::new(CountingClassifier::default());
    let report = run::classify(&args, &config, first.clone(), &CancellationToken::new())
        .await
        .unwrap();
    // last_login plus one shared nickname fingerprint in a single batch
    assert_eq!(first.calls.load(Ordering::SeqCst), 1);
    let staff = report
        .result_for(&ColumnId::new("staff", "nickname"))
        .unwrap();
    assert_eq!(staff.category(), PrivacyCategory::QuasiIdentifier);
    assert!(config.cache.path.exists());

    let second = Arc::new(CountingClassifier::default());
    let rerun = run::classify(&args, &config, second.clone(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    assert_eq!(rerun.summary.cache_hits, 3);

    let categories = |r: &privsurvey_core::Report| {
        r.results().map(|c| c.category()).collect::<Vec<_>>()
    };
    assert_eq!(categories(&report), categories(&rerun));
}

#[tokio::test]
async fn test_integration_cancelled_run_writes_no_report() {
    let dir = tempfile::tempdir().unwrap();
    let (args, config) = setup(dir.path(), "report.json");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = run::classify(
        &args,
        &config,
        Arc::new(CountingClassifier::default()),
        &cancel,
    )
    .await;

    assert!(matches!(result, Err(PrivSurveyError::Cancelled)));
    assert!(!args.output.exists());
    assert!(config.cache.path.exists());
}

#[tokio::test]
async fn test_integration_missing_source_fails_before_classification() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = ClassifyArgs::new(dir.path().join("missing.json").display().to_string());
    args.output = dir.path().join("report.json");
    args.no_cache = true;
    let config = run::apply_overrides(PrivSurveyConfig::default(), &args).unwrap();

    let counting = Arc::new(CountingClassifier::default());
    let result = run::classify(&args, &config, counting.clone(), &CancellationToken::new()).await;

    assert!(matches!(result, Err(PrivSurveyError::Io { .. })));
    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_integration_test_source_counts() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_schema(dir.path());
    let schema = run::test_source(&source, &PrivSurveyConfig::default())
        .await
        .unwrap();
    assert_eq!(schema.database_name(), "crm");
    assert_eq!(schema.tables().len(), 3);
    assert_eq!(schema.column_count(), 5);
}
