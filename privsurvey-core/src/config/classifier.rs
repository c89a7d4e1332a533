//! Remote classifier, batching and retry configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Generative Language API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

/// Remote classifier and dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Base URL of the classification service
    pub endpoint: String,
    /// Model identifier
    pub model: String,
    /// Maximum columns per remote request
    pub batch_size: usize,
    /// Maximum remote requests in flight
    pub max_concurrency: usize,
    /// Timeout for a single remote call, in seconds
    pub request_timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: "gemini-1.5-flash".to_string(),
            batch_size: 20,
            max_concurrency: 4,
            request_timeout_secs: 30,
        }
    }
}

impl ClassifierConfig {
    /// Creates a new classifier config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Builder method to set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Builder method to set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder method to set the concurrency limit.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Builder method to set the per-call timeout.
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Per-call timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("classifier.batch_size must be at least 1".to_string());
        }
        if self.max_concurrency == 0 {
            return Err("classifier.max_concurrency must be at least 1".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("classifier.request_timeout_secs must be at least 1".to_string());
        }
        if url::Url::parse(&self.endpoint).is_err() {
            return Err(format!(
                "classifier.endpoint '{}' is not a valid URL",
                self.endpoint
            ));
        }
        if self.model.trim().is_empty() {
            return Err("classifier.model must not be empty".to_string());
        }
        Ok(())
    }
}

/// Exponential backoff policy for transient classifier failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    pub initial_backoff_ms: u64,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Upper bound for any single delay, in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 500,
            multiplier: 2.0,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the attempt limit.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Builder method to set the first delay.
    pub fn with_initial_backoff_ms(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    /// Builder method to set the growth factor.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Builder method to set the delay cap.
    pub fn with_max_backoff_ms(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    /// Initial delay as a duration.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Delay cap as a duration.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.multiplier
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err("retry.max_backoff_ms must be >= retry.initial_backoff_ms".to_string());
        }
        Ok(())
    }
}
