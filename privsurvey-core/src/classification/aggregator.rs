//! Aggregator: drives the pipeline and assembles the report.

use super::adapter::{BatchOutcome, ClassifierAdapter};
use super::cache::ClassificationCache;
use super::rules::RuleEngine;
use super::{ClassificationResult, Fingerprint};
use crate::error::{PrivSurveyError, Result};
use crate::models::{ColumnDescriptor, ColumnId, SchemaModel};
use crate::report::{ColumnReport, Report, RunCounters, TableSection};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Merges rule, cache and AI results into one report.
pub struct Aggregator {
    rules: RuleEngine,
    cache: Arc<dyn ClassificationCache>,
    adapter: ClassifierAdapter,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("rules", &self.rules.rules().len())
            .field("cache_entries", &self.cache.len())
            .field("adapter", &self.adapter)
            .finish()
    }
}

impl Aggregator {
    /// Combines the rule engine, the cache and the adapter for remote calls.
    ///
    /// `cache` should be the same cache the adapter writes to, so results
    /// stored by one run are found by the next.
    pub fn new(
        rules: RuleEngine,
        cache: Arc<dyn ClassificationCache>,
        adapter: ClassifierAdapter,
    ) -> Self {
        Self {
            rules,
            cache,
            adapter,
        }
    }

    /// Classifies every column of `schema`.
    ///
    /// Never fails and never omits a column: classifier and cache problems
    /// degrade the affected columns to `unknown`.
    pub async fn run(&self, schema: &SchemaModel) -> Report {
        let mut counters = RunCounters::default();
        let mut rule_hits: HashMap<ColumnId, ClassificationResult> = HashMap::new();
        let mut unmatched: Vec<ColumnDescriptor> = Vec::new();

        for column in schema.columns() {
            match self.rules.classify(column) {
                Some(result) => {
                    rule_hits.insert(column.id().clone(), result);
                }
                None => unmatched.push(column.clone()),
            }
        }
        tracing::info!(
            "Rules resolved {} of {} columns",
            rule_hits.len(),
            schema.column_count()
        );

        let (cached, misses) = self.split_cached(unmatched);
        counters.cache_hits = cached.len();
        if !cached.is_empty() {
            tracing::info!("{} columns served from cache", cached.len());
        }

        let BatchOutcome {
            results: classified,
            degraded,
            stats,
        } = if misses.is_empty() {
            BatchOutcome::default()
        } else {
            self.adapter.classify_batch(&misses).await
        };
        counters.cache_hits += stats.cache_hits;
        counters.remote_calls = stats.remote_calls;

        let mut merged: HashMap<ColumnId, ClassificationResult> = cached;
        for (id, result) in classified {
            merged.insert(id, result);
        }
        // Rule results always take precedence
        merged.extend(rule_hits);

        let tables = schema
            .tables()
            .iter()
            .map(|table| TableSection {
                table_name: table.name.clone(),
                columns: table
                    .columns
                    .iter()
                    .map(|column| {
                        let result = merged.remove(column.id()).unwrap_or_else(|| {
                            tracing::error!("No classification for {}; marking unknown", column.id());
                            ClassificationResult::unknown(column.id().clone())
                        });
                        ColumnReport::new(column, result)
                    })
                    .collect(),
            })
            .collect();

        let report = Report::new(schema.database_name(), tables, degraded, counters);
        tracing::info!(
            "Classified {} columns: {} by rule, {} by AI, {} need review",
            report.summary.total_columns,
            report.summary.rule_matches,
            report.summary.ai_classified,
            report.summary.needs_review
        );
        report
    }

    /// Like [`Aggregator::run`], but stops when `cancel` fires.
    ///
    /// In-flight remote calls are abandoned; cache entries written before
    /// cancellation stay valid.
    ///
    /// # Errors
    /// Returns [`PrivSurveyError::Cancelled`] if the token fires first.
    pub async fn run_with_cancel(
        &self,
        schema: &SchemaModel,
        cancel: &CancellationToken,
    ) -> Result<Report> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::warn!("Classification run cancelled");
                Err(PrivSurveyError::Cancelled)
            }
            report = self.run(schema) => Ok(report),
        }
    }

    /// Rule engine in use.
    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    /// Splits rule misses into cache hits and columns still to classify.
    fn split_cached(
        &self,
        columns: Vec<ColumnDescriptor>,
    ) -> (HashMap<ColumnId, ClassificationResult>, Vec<ColumnDescriptor>) {
        let mut hits = HashMap::new();
        let mut misses = Vec::new();
        let mut warned = false;

        for column in columns {
            match self.cache.lookup(&Fingerprint::of(&column)) {
                Ok(Some(cached)) => {
                    hits.insert(column.id().clone(), cached.for_column(column.id().clone()));
                }
                Ok(None) => misses.push(column),
                Err(e) => {
                    if !warned {
                        tracing::warn!("Cache unavailable, falling back to classifier: {}", e);
                        warned = true;
                    }
                    misses.push(column);
                }
            }
        }
        (hits, misses)
    }
}
