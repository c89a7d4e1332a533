//! Command workflows: classification runs, ruleset listing, cache
//! maintenance and source testing.

use crate::output::create_sink;
use crate::{API_KEY_ENV, CacheAction, ClassifyArgs};
use privsurvey_core::classification::{
    Aggregator, ClassificationCache, ClassifierAdapter, DisabledClassifier, FileCache,
    GeminiClassifier, RemoteClassifier, RuleEngine,
};
use privsurvey_core::config::{ClassifierConfig, PrivSurveyConfig};
use privsurvey_core::error::redact_database_url;
use privsurvey_core::models::SchemaModel;
use privsurvey_core::schema::create_reader;
use privsurvey_core::{Report, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

/// Loads the configuration file, or defaults when none is given.
///
/// # Errors
/// Returns an error if the file cannot be read or is invalid.
pub async fn load_config(path: Option<&Path>) -> Result<PrivSurveyConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            PrivSurveyConfig::load(path).await
        }
        None => Ok(PrivSurveyConfig::default()),
    }
}

/// Applies command-line overrides on top of file values.
///
/// # Errors
/// Returns a configuration error if the merged configuration is invalid.
pub fn apply_overrides(
    mut config: PrivSurveyConfig,
    args: &ClassifyArgs,
) -> Result<PrivSurveyConfig> {
    if let Some(path) = &args.cache_path {
        config.cache.path = path.clone();
    }
    if args.no_cache {
        config.cache.enabled = false;
    }
    if let Some(batch_size) = args.batch_size {
        config.classifier.batch_size = batch_size;
    }
    if let Some(max_concurrency) = args.max_concurrency {
        config.classifier.max_concurrency = max_concurrency;
    }
    if let Some(sample_size) = args.sample_size {
        config.sampling.sample_size = sample_size;
    }
    config.validate()?;
    Ok(config)
}

/// Reads the API key from the environment; blank values count as unset.
pub fn api_key_from_env() -> Option<Zeroizing<String>> {
    std::env::var(API_KEY_ENV)
        .ok()
        .map(Zeroizing::new)
        .filter(|key| !key.trim().is_empty())
}

/// Picks the remote classifier for this run.
///
/// Falls back to [`DisabledClassifier`] in rules-only mode, without an API
/// key, or if the HTTP client cannot be built.
pub fn build_classifier(
    config: &ClassifierConfig,
    api_key: Option<Zeroizing<String>>,
    rules_only: bool,
) -> Arc<dyn RemoteClassifier> {
    if rules_only {
        info!("Rules-only mode: remote classifier disabled");
        return Arc::new(DisabledClassifier::new("rules-only mode"));
    }
    let Some(api_key) = api_key else {
        warn!(
            "{} is not set; columns without a rule or cached result will be marked unknown",
            API_KEY_ENV
        );
        return Arc::new(DisabledClassifier::new(format!("{} is not set", API_KEY_ENV)));
    };
    match GeminiClassifier::new(config, api_key) {
        Ok(classifier) => {
            info!("Using remote classifier model {}", config.model);
            Arc::new(classifier)
        }
        Err(e) => {
            warn!("Remote classifier unavailable: {}", e);
            Arc::new(DisabledClassifier::new(e.to_string()))
        }
    }
}

/// Runs the classification pipeline and writes the report.
///
/// The cache is saved even when the run is cancelled, so completed
/// classifications survive an interrupted run.
///
/// # Errors
/// Returns an error for configuration, schema-read, ruleset and report
/// failures, or [`privsurvey_core::PrivSurveyError::Cancelled`].
pub async fn classify(
    args: &ClassifyArgs,
    config: &PrivSurveyConfig,
    remote: Arc<dyn RemoteClassifier>,
    cancel: &CancellationToken,
) -> Result<Report> {
    info!("Starting classification run");
    info!("Source: {}", redact_source(&args.source));
    info!("Output: {}", args.output.display());

    let rules = RuleEngine::new(&config.rules)?;
    let reader = create_reader(&args.source, &config.sampling).await?;
    let schema = reader.read_schema().await.map_err(|e| {
        error!("Schema read failed: {}", e);
        e
    })?;
    info!(
        "Read {} tables with {} columns from {}",
        schema.tables().len(),
        schema.column_count(),
        reader.source_description()
    );

    let cache = Arc::new(FileCache::open(&config.cache).await);
    let shared: Arc<dyn ClassificationCache> = cache.clone();
    let adapter = ClassifierAdapter::new(
        remote,
        Arc::clone(&shared),
        &config.classifier,
        &config.retry,
    );
    let aggregator = Aggregator::new(rules, shared, adapter);

    let outcome = aggregator.run_with_cancel(&schema, cancel).await;
    if config.cache.enabled
        && let Err(e) = cache.save().await
    {
        warn!("Failed to save classification cache: {}", e);
    }
    let report = outcome?;

    let sink = create_sink(args.report_format(), &args.output);
    sink.write(&report).await?;
    info!("Report saved to {}", sink.destination().display());
    Ok(report)
}

/// Prints a run summary to stdout.
pub fn print_summary(report: &Report, output: &Path) {
    let summary = &report.summary;
    println!("Classification completed");
    println!("Output: {}", output.display());
    println!("Tables: {}", summary.total_tables);
    println!("Columns: {}", summary.total_columns);
    for (category, count) in &summary.by_category {
        println!("  {}: {}", category, count);
    }
    println!(
        "Rule matches: {}, AI classified: {}, cache hits: {}, remote calls: {}",
        summary.rule_matches, summary.ai_classified, summary.cache_hits, summary.remote_calls
    );
    if summary.needs_review > 0 {
        println!("Needs review: {} columns", summary.needs_review);
    }
    if summary.degraded_batches > 0 {
        println!("Degraded batches: {}", summary.degraded_batches);
    }
}

/// Renders the effective ruleset, one rule per line.
///
/// # Errors
/// Returns the ruleset error if any rule fails to compile.
pub fn describe_rules(config: &PrivSurveyConfig) -> Result<Vec<String>> {
    let engine = RuleEngine::new(&config.rules)?;
    let mut lines = vec![format!(
        "{} rules (high-confidence threshold {:.2})",
        engine.rules().len(),
        engine.threshold()
    )];
    for rule in engine.rules() {
        lines.push(format!(
            "{:<16} {:<20} {:.2}  name={} type={}",
            rule.name(),
            rule.category().as_str(),
            rule.confidence().value(),
            rule.name_pattern().unwrap_or("*"),
            rule.type_pattern().unwrap_or("*"),
        ));
    }
    Ok(lines)
}

/// Runs a cache maintenance action and returns lines to print.
///
/// # Errors
/// Returns an error if the cache file is unreadable, or cannot be saved
/// after a purge.
pub async fn cache_command(config: &PrivSurveyConfig, action: &CacheAction) -> Result<Vec<String>> {
    let cache = FileCache::load_all(&config.cache)
        .await
        .map_err(|e| privsurvey_core::PrivSurveyError::configuration(e.to_string()))?;
    let location = config.cache.path.display().to_string();

    match action {
        CacheAction::Stats => {
            let stats = cache.stats();
            let mut lines = vec![
                format!("Cache: {}", location),
                format!("Entries: {} (max {})", stats.total_entries, stats.max_entries),
                format!("Expired: {}", stats.expired_entries),
            ];
            if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
                lines.push(format!("Oldest: {}", oldest.to_rfc3339()));
                lines.push(format!("Newest: {}", newest.to_rfc3339()));
            }
            Ok(lines)
        }
        CacheAction::Purge { all } => {
            let before = cache.len();
            if *all {
                cache.clear();
            } else {
                cache.purge_expired();
            }
            let removed = before.saturating_sub(cache.len());
            if cache.is_dirty() {
                cache
                    .save()
                    .await
                    .map_err(|e| privsurvey_core::PrivSurveyError::configuration(e.to_string()))?;
            }
            Ok(vec![format!(
                "Removed {} entries from {} ({} remaining)",
                removed,
                location,
                cache.len()
            )])
        }
    }
}

/// Reads a schema source without classifying it.
///
/// # Errors
/// Returns an error if the source cannot be opened or read.
pub async fn test_source(source: &str, config: &PrivSurveyConfig) -> Result<SchemaModel> {
    info!("Testing schema source {}", redact_source(source));
    let reader = create_reader(source, &config.sampling).await?;
    let schema = reader.read_schema().await?;
    info!("Schema source test successful");
    Ok(schema)
}

/// Redacts database URLs; file paths are shown as given.
fn redact_source(source: &str) -> String {
    if source.contains("://") {
        redact_database_url(source)
    } else {
        source.to_string()
    }
}
