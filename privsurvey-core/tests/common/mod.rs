//! Shared fakes for pipeline integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use privsurvey_core::classification::{
    Aggregator, ClassificationCache, ClassificationResult, ClassifierAdapter, FeatureTuple,
    FileCache, Fingerprint, RemoteClassifier, RemoteLabel, RetryPolicy, RuleEngine,
};
use privsurvey_core::config::{CacheConfig, ClassifierConfig, RetryConfig, RulesConfig};
use privsurvey_core::error::{CacheError, ClassifierError};
use privsurvey_core::models::{RawColumn, RawTable, SchemaModel};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Remote classifier fake that labels columns by name.
///
/// Scripted failures are consumed one per call before any success.
#[derive(Debug, Default)]
pub struct FakeClassifier {
    labels: HashMap<String, (String, f64)>,
    failures: Mutex<VecDeque<ClassifierError>>,
    omit: Vec<String>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl FakeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `category` for columns named `name`.
    pub fn label(mut self, name: &str, category: &str, confidence: f64) -> Self {
        self.labels
            .insert(name.to_string(), (category.to_string(), confidence));
        self
    }

    /// Fails the next calls with these errors, in order.
    pub fn fail_with(self, errors: Vec<ClassifierError>) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.extend(errors);
        }
        self
    }

    /// Leaves columns named `name` out of every response.
    pub fn omit(mut self, name: &str) -> Self {
        self.omit.push(name.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Column names received across all calls.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RemoteClassifier for FakeClassifier {
    async fn classify(&self, batch: &[FeatureTuple]) -> Result<Vec<RemoteLabel>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.extend(batch.iter().map(|t| t.name.clone()));
        }
        let scripted = self.failures.lock().ok().and_then(|mut f| f.pop_front());
        if let Some(error) = scripted {
            return Err(error);
        }

        Ok(batch
            .iter()
            .filter(|t| !self.omit.contains(&t.name))
            .map(|t| {
                let (category, confidence) = self
                    .labels
                    .get(&t.name)
                    .cloned()
                    .unwrap_or_else(|| ("non_personal".to_string(), 0.7));
                RemoteLabel::new(t.reference.clone(), category, confidence)
            })
            .collect())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Classifier that never answers.
#[derive(Debug, Default)]
pub struct HangingClassifier;

#[async_trait]
impl RemoteClassifier for HangingClassifier {
    async fn classify(&self, _batch: &[FeatureTuple]) -> Result<Vec<RemoteLabel>, ClassifierError> {
        std::future::pending().await
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

/// Classifier that records how many calls overlap.
#[derive(Debug)]
pub struct GaugedClassifier {
    latency: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl GaugedClassifier {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Highest number of simultaneous calls observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteClassifier for GaugedClassifier {
    async fn classify(&self, batch: &[FeatureTuple]) -> Result<Vec<RemoteLabel>, ClassifierError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(batch
            .iter()
            .map(|t| RemoteLabel::new(t.reference.clone(), "non_personal", 0.7))
            .collect())
    }

    fn name(&self) -> &str {
        "gauged"
    }
}

/// Classifier that never answers batches containing one column name.
#[derive(Debug)]
pub struct StallingClassifier {
    stall_on: String,
}

impl StallingClassifier {
    pub fn new(stall_on: &str) -> Self {
        Self {
            stall_on: stall_on.to_string(),
        }
    }
}

#[async_trait]
impl RemoteClassifier for StallingClassifier {
    async fn classify(&self, batch: &[FeatureTuple]) -> Result<Vec<RemoteLabel>, ClassifierError> {
        if batch.iter().any(|t| t.name == self.stall_on) {
            std::future::pending::<()>().await;
        }
        Ok(batch
            .iter()
            .map(|t| RemoteLabel::new(t.reference.clone(), "quasi_identifier", 0.6))
            .collect())
    }

    fn name(&self) -> &str {
        "stalling"
    }
}

/// Cache whose every operation fails.
#[derive(Debug, Default)]
pub struct BrokenCache;

impl ClassificationCache for BrokenCache {
    fn lookup(&self, _fingerprint: &Fingerprint) -> Result<Option<ClassificationResult>, CacheError> {
        Err(CacheError::Backend("disk on fire".to_string()))
    }

    fn store(
        &self,
        _fingerprint: Fingerprint,
        _result: ClassificationResult,
    ) -> Result<(), CacheError> {
        Err(CacheError::Backend("disk on fire".to_string()))
    }

    fn len(&self) -> usize {
        0
    }

    fn purge_expired(&self) -> usize {
        0
    }
}

pub fn memory_cache() -> Arc<dyn ClassificationCache> {
    Arc::new(FileCache::in_memory(&CacheConfig::default()))
}

/// Retry policy with short, deterministic delays.
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        Duration::from_millis(10),
        2.0,
        Duration::from_millis(40),
    )
}

pub fn aggregator_with(
    remote: Arc<dyn RemoteClassifier>,
    cache: Arc<dyn ClassificationCache>,
    classifier: &ClassifierConfig,
    policy: RetryPolicy,
) -> Aggregator {
    let adapter = ClassifierAdapter::new(remote, Arc::clone(&cache), classifier, &RetryConfig::default())
        .with_policy(policy);
    Aggregator::new(
        RuleEngine::new(&RulesConfig::default()).expect("default rules compile"),
        cache,
        adapter,
    )
}

pub fn aggregator(
    remote: Arc<dyn RemoteClassifier>,
    cache: Arc<dyn ClassificationCache>,
) -> Aggregator {
    aggregator_with(remote, cache, &ClassifierConfig::default(), fast_policy(3))
}

/// `users(email, ssn, last_login)`
pub fn users_schema() -> SchemaModel {
    SchemaModel::from_raw(
        "app",
        vec![RawTable::new(
            "users",
            vec![
                RawColumn::new("email", "text"),
                RawColumn::new("ssn", "text"),
                RawColumn::new("last_login", "timestamp"),
            ],
        )],
    )
}

/// Two tables sharing an identical `nickname` column.
pub fn shared_column_schema() -> SchemaModel {
    SchemaModel::from_raw(
        "app",
        vec![
            RawTable::new(
                "customers",
                vec![
                    RawColumn::new("id", "integer"),
                    RawColumn::new("nickname", "varchar(40)").with_sample_digest("abc123"),
                ],
            ),
            RawTable::new(
                "staff",
                vec![RawColumn::new("nickname", "varchar(40)").with_sample_digest("abc123")],
            ),
        ],
    )
}

/// One table with `count` non-rule columns.
pub fn wide_schema(count: usize) -> SchemaModel {
    SchemaModel::from_raw(
        "wide",
        vec![RawTable::new(
            "events",
            (0..count)
                .map(|i| RawColumn::new(format!("attr_{}", i), "text"))
                .collect(),
        )],
    )
}
