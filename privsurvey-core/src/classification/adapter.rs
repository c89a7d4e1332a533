//! AI Classifier Adapter.
//!
//! Wraps a [`RemoteClassifier`] with cache consultation, fingerprint
//! deduplication, batching, bounded concurrency, retry and per-call timeout.
//! Every column handed in comes back with exactly one `ai`-sourced result;
//! failures degrade to `unknown` and are reported as [`DegradedBatch`]
//! markers instead of errors.

use super::cache::ClassificationCache;
use super::remote::{FeatureTuple, RemoteClassifier, RemoteLabel};
use super::retry::{RetryFailure, RetryPolicy, run_with_retry};
use super::{ClassificationResult, Confidence, Fingerprint, PrivacyAnnotations, PrivacyCategory};
use crate::config::{ClassifierConfig, RetryConfig};
use crate::models::{ColumnDescriptor, ColumnId};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Signal that a batch fell back to `unknown` for some or all of its columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedBatch {
    /// 0-based batch number within the run
    pub batch: usize,
    /// Columns that received the `unknown` fallback
    pub columns: Vec<ColumnId>,
    /// Human readable cause
    pub reason: String,
    /// Remote attempts made for the batch
    pub attempts: u32,
}

/// Counters for one adapter invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterStats {
    /// Columns served from the cache
    pub cache_hits: usize,
    /// Cache lookups or writes that failed
    pub cache_errors: usize,
    /// Distinct fingerprints sent to the remote classifier
    pub unique_requests: usize,
    /// Batches dispatched
    pub batches: usize,
    /// Remote calls made, retries included
    pub remote_calls: usize,
    /// Columns that fell back to `unknown`
    pub failed_columns: usize,
}

/// Result of [`ClassifierAdapter::classify_batch`].
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// One `ai`-sourced result per requested column
    pub results: HashMap<ColumnId, ClassificationResult>,
    /// Batches that fell back to `unknown`, fully or in part
    pub degraded: Vec<DegradedBatch>,
    /// Counters for this invocation
    pub stats: AdapterStats,
}

/// Columns sharing one fingerprint; classified once.
#[derive(Debug)]
struct PendingGroup {
    fingerprint: Fingerprint,
    tuple: FeatureTuple,
    columns: Vec<ColumnId>,
}

struct BatchReply {
    index: usize,
    groups: Vec<PendingGroup>,
    reply: Result<Vec<RemoteLabel>, RetryFailure>,
    attempts: u32,
}

/// Cache-aware, batching, retrying front end of the remote classifier.
pub struct ClassifierAdapter {
    remote: Arc<dyn RemoteClassifier>,
    cache: Arc<dyn ClassificationCache>,
    batch_size: usize,
    max_concurrency: usize,
    call_timeout: Duration,
    policy: RetryPolicy,
}

impl std::fmt::Debug for ClassifierAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierAdapter")
            .field("remote", &self.remote.name())
            .field("batch_size", &self.batch_size)
            .field("max_concurrency", &self.max_concurrency)
            .field("call_timeout", &self.call_timeout)
            .field("policy", &self.policy)
            .finish()
    }
}

impl ClassifierAdapter {
    /// Creates an adapter from the classifier and retry sections.
    pub fn new(
        remote: Arc<dyn RemoteClassifier>,
        cache: Arc<dyn ClassificationCache>,
        config: &ClassifierConfig,
        retry: &RetryConfig,
    ) -> Self {
        Self {
            remote,
            cache,
            batch_size: config.batch_size.max(1),
            max_concurrency: config.max_concurrency.max(1),
            call_timeout: config.request_timeout(),
            policy: RetryPolicy::from(retry),
        }
    }

    /// Builder method to override the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Builder method to override the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Shared cache this adapter reads and populates.
    pub fn cache(&self) -> &Arc<dyn ClassificationCache> {
        &self.cache
    }

    /// Classifies columns, consulting the cache first.
    ///
    /// The returned map holds exactly one result for every distinct column
    /// identity in `columns`.
    pub async fn classify_batch(&self, columns: &[ColumnDescriptor]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let groups = self.resolve_from_cache(columns, &mut outcome);
        if groups.is_empty() {
            return outcome;
        }

        outcome.stats.unique_requests = groups.len();
        let batches = into_batches(groups, self.batch_size);
        let total = batches.len();
        outcome.stats.batches = total;
        tracing::info!(
            "Dispatching {} unique columns to {} classifier in {} batches",
            outcome.stats.unique_requests,
            self.remote.name(),
            total
        );

        let calls = AtomicUsize::new(0);
        let mut replies = futures::stream::iter(batches.into_iter().enumerate())
            .map(|(index, groups)| self.dispatch(index, groups, &calls))
            .buffer_unordered(self.max_concurrency);

        let mut completed = 0;
        while let Some(reply) = replies.next().await {
            completed += 1;
            self.absorb(reply, &mut outcome);
            tracing::info!("{} of {} batches complete", completed, total);
        }
        drop(replies);

        outcome.stats.remote_calls = calls.load(Ordering::Relaxed);
        outcome
    }

    /// Serves cache hits and groups the misses by fingerprint.
    fn resolve_from_cache(
        &self,
        columns: &[ColumnDescriptor],
        outcome: &mut BatchOutcome,
    ) -> Vec<PendingGroup> {
        let mut groups: Vec<PendingGroup> = Vec::new();
        let mut by_fingerprint: HashMap<Fingerprint, usize> = HashMap::new();

        for column in columns {
            if outcome.results.contains_key(column.id()) {
                continue;
            }
            let fingerprint = Fingerprint::of(column);

            match self.cache.lookup(&fingerprint) {
                Ok(Some(cached)) => {
                    outcome.stats.cache_hits += 1;
                    outcome
                        .results
                        .insert(column.id().clone(), cached.for_column(column.id().clone()));
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    if outcome.stats.cache_errors == 0 {
                        tracing::warn!("Cache lookup failed, treating as miss: {}", e);
                    }
                    outcome.stats.cache_errors += 1;
                }
            }

            match by_fingerprint.get(&fingerprint) {
                Some(&index) => {
                    if let Some(group) = groups.get_mut(index) {
                        group.columns.push(column.id().clone());
                    }
                }
                None => {
                    by_fingerprint.insert(fingerprint.clone(), groups.len());
                    groups.push(PendingGroup {
                        tuple: FeatureTuple::for_column(fingerprint.to_string(), column),
                        fingerprint,
                        columns: vec![column.id().clone()],
                    });
                }
            }
        }

        groups
    }

    async fn dispatch(
        &self,
        index: usize,
        groups: Vec<PendingGroup>,
        calls: &AtomicUsize,
    ) -> BatchReply {
        let tuples: Vec<FeatureTuple> = groups.iter().map(|g| g.tuple.clone()).collect();
        let remote = &self.remote;
        let tuples_ref = &tuples;
        let attempts = AtomicUsize::new(0);
        let attempts_ref = &attempts;

        let reply = run_with_retry(&self.policy, self.call_timeout, move |_attempt| {
            calls.fetch_add(1, Ordering::Relaxed);
            attempts_ref.fetch_add(1, Ordering::Relaxed);
            remote.classify(tuples_ref)
        })
        .await;

        BatchReply {
            index,
            groups,
            reply,
            attempts: u32::try_from(attempts.load(Ordering::Relaxed)).unwrap_or(u32::MAX),
        }
    }

    /// Turns one batch reply into per-column results.
    ///
    /// Every label that passes validation is cached, including a deliberate
    /// `unknown` answer; only the failure fallback is left out of the cache.
    fn absorb(&self, reply: BatchReply, outcome: &mut BatchOutcome) {
        let BatchReply {
            index,
            groups,
            reply,
            attempts,
        } = reply;

        let labels = match reply {
            Ok(labels) => labels,
            Err(failure) => {
                tracing::warn!(
                    "Batch {} failed after {} attempt(s): {}; {} columns marked unknown",
                    index,
                    failure.attempts,
                    failure.error,
                    groups.iter().map(|g| g.columns.len()).sum::<usize>()
                );
                let columns = fail_groups(groups, outcome);
                outcome.degraded.push(DegradedBatch {
                    batch: index,
                    columns,
                    reason: failure.error.to_string(),
                    attempts: failure.attempts,
                });
                return;
            }
        };

        let requested = groups.len();
        let mut by_reference: HashMap<String, RemoteLabel> = HashMap::with_capacity(labels.len());
        let mut extraneous = 0;
        for label in labels {
            if by_reference.contains_key(&label.reference)
                || !groups.iter().any(|g| g.tuple.reference == label.reference)
            {
                extraneous += 1;
                continue;
            }
            by_reference.insert(label.reference.clone(), label);
        }

        let mut unresolved: Vec<PendingGroup> = Vec::new();
        let mut invalid = 0;
        for group in groups {
            let Some(label) = by_reference.remove(&group.tuple.reference) else {
                unresolved.push(group);
                continue;
            };
            let Some(result) = to_result(&group, label) else {
                invalid += 1;
                unresolved.push(group);
                continue;
            };

            if let Err(e) = self.cache.store(group.fingerprint.clone(), result.clone()) {
                if outcome.stats.cache_errors == 0 {
                    tracing::warn!("Cache write failed: {}", e);
                }
                outcome.stats.cache_errors += 1;
            }
            for column in group.columns {
                outcome
                    .results
                    .insert(column.clone(), result.for_column(column));
            }
        }

        if !unresolved.is_empty() || extraneous > 0 {
            let missing = unresolved.len().saturating_sub(invalid);
            let reason = format!(
                "Malformed or partial response: {} of {} columns missing, {} invalid, {} unexpected entries",
                missing, requested, invalid, extraneous
            );
            tracing::warn!("Batch {}: {}", index, reason);
            if !unresolved.is_empty() {
                let columns = fail_groups(unresolved, outcome);
                outcome.degraded.push(DegradedBatch {
                    batch: index,
                    columns,
                    reason,
                    attempts,
                });
            }
        }
    }
}

fn into_batches(groups: Vec<PendingGroup>, batch_size: usize) -> Vec<Vec<PendingGroup>> {
    let mut batches = Vec::with_capacity(groups.len().div_ceil(batch_size));
    let mut current = Vec::with_capacity(batch_size);
    for group in groups {
        current.push(group);
        if current.len() == batch_size {
            batches.push(std::mem::replace(&mut current, Vec::with_capacity(batch_size)));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Validates a remote label; `None` for unknown labels or bad confidence.
///
/// Annotation values outside their vocabulary are dropped without failing
/// the column.
fn to_result(group: &PendingGroup, label: RemoteLabel) -> Option<ClassificationResult> {
    let category: PrivacyCategory = label.category.parse().ok()?;
    let confidence = Confidence::new(label.confidence).ok()?;
    let column = group.columns.first()?.clone();
    let annotations = PrivacyAnnotations {
        description: non_blank(label.description),
        requirement: label.requirement.and_then(|v| v.parse().ok()),
        collection_method: label.collection_method.and_then(|v| v.parse().ok()),
        data_source: label.data_source.and_then(|v| v.parse().ok()),
        purpose: non_blank(label.purpose),
        legal_basis: non_blank(label.legal_basis),
        personal_data: label.personal_data,
        personal_information: label.personal_information,
    };
    Some(ClassificationResult::from_ai(
        column,
        category,
        confidence,
        Some(annotations),
    ))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Gives every column of `groups` the `unknown` fallback.
fn fail_groups(groups: Vec<PendingGroup>, outcome: &mut BatchOutcome) -> Vec<ColumnId> {
    let mut failed = Vec::new();
    for column in groups.into_iter().flat_map(|g| g.columns) {
        outcome
            .results
            .insert(column.clone(), ClassificationResult::unknown(column.clone()));
        failed.push(column);
    }
    outcome.stats.failed_columns += failed.len();
    failed
}
