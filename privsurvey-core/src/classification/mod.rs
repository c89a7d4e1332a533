//! Classification pipeline.
//!
//! Data flow: Schema Model → [`RuleEngine`] → (unresolved subset) →
//! [`ClassifierAdapter`] (consulting and populating the
//! [`ClassificationCache`]) → [`Aggregator`] → [`crate::report::Report`].

pub mod adapter;
pub mod aggregator;
pub mod cache;
pub mod fingerprint;
pub mod gemini;
pub mod remote;
pub mod result;
pub mod retry;
pub mod rules;

pub use adapter::{AdapterStats, BatchOutcome, ClassifierAdapter, DegradedBatch};
pub use aggregator::Aggregator;
pub use cache::{CacheEntry, CacheStats, ClassificationCache, FileCache};
pub use fingerprint::Fingerprint;
pub use gemini::GeminiClassifier;
pub use remote::{DisabledClassifier, FeatureTuple, RemoteClassifier, RemoteLabel};
pub use result::{
    ClassificationResult, ClassificationSource, CollectionMethod, Confidence, DataSource,
    FieldRequirement, InvalidConfidence, PrivacyAnnotations, PrivacyCategory,
    UnknownCategoryLabel, UnrecognizedAnnotation,
};
pub use retry::{RetryFailure, RetryPolicy, RetryState, run_with_retry};
pub use rules::{CompiledRule, RuleEngine};
