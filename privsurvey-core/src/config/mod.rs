//! Run configuration.
//!
//! Every section is optional in the TOML file and falls back to its default:
//!
//! ```toml
//! [rules]
//! high_confidence_threshold = 0.9
//!
//! [[rules.rule]]
//! name = "iban"
//! name_pattern = "iban"
//! category = "direct_identifier"
//! confidence = 0.95
//!
//! [cache]
//! path = ".privsurvey/cache.json"
//! max_entries = 10000
//!
//! [classifier]
//! batch_size = 20
//! max_concurrency = 4
//!
//! [retry]
//! max_attempts = 4
//!
//! [sampling]
//! sample_size = 5
//! ```
//!
//! # Security
//! These structs never hold credentials. The API key and database passwords
//! are supplied through the environment or the command line.

mod cache;
mod classifier;
mod rules;
mod sampling;

pub use cache::CacheConfig;
pub use classifier::{ClassifierConfig, DEFAULT_ENDPOINT, RetryConfig};
pub use rules::{RuleDefinition, RulesConfig};
pub use sampling::{MAX_SAMPLE_SIZE, SamplingConfig};

use crate::error::{PrivSurveyError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete configuration of one classification run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivSurveyConfig {
    pub rules: RulesConfig,
    pub cache: CacheConfig,
    pub classifier: ClassifierConfig,
    pub retry: RetryConfig,
    pub sampling: SamplingConfig,
}

impl PrivSurveyConfig {
    /// Creates a configuration with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a TOML document.
    ///
    /// Rule patterns are validated separately when the rule engine compiles
    /// them.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            PrivSurveyError::configuration(format!("Invalid configuration file: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML configuration file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            PrivSurveyError::io(
                format!("Failed to read configuration file {}", path.display()),
                e,
            )
        })?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Builder method to replace the rules section.
    pub fn with_rules(mut self, rules: RulesConfig) -> Self {
        self.rules = rules;
        self
    }

    /// Builder method to replace the cache section.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Builder method to replace the classifier section.
    pub fn with_classifier(mut self, classifier: ClassifierConfig) -> Self {
        self.classifier = classifier;
        self
    }

    /// Builder method to replace the retry section.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Builder method to replace the sampling section.
    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.cache
            .validate()
            .and_then(|()| self.classifier.validate())
            .and_then(|()| self.retry.validate())
            .and_then(|()| self.sampling.validate())
            .map_err(PrivSurveyError::configuration)
    }

    /// Renders the configuration back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            PrivSurveyError::configuration(format!("Failed to render configuration: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::PrivacyCategory;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = PrivSurveyConfig::from_toml_str("").unwrap();
        assert_eq!(config, PrivSurveyConfig::default());
        assert_eq!(config.rules.rules.len(), 3);
    }

    #[test]
    fn test_partial_document() {
        let config = PrivSurveyConfig::from_toml_str(
            r#"
            [classifier]
            batch_size = 5

            [retry]
            max_attempts = 2

            [[rules.rule]]
            name = "iban"
            name_pattern = "iban"
            category = "direct_identifier"
            confidence = 0.95
            "#,
        )
        .unwrap();

        assert_eq!(config.classifier.batch_size, 5);
        assert_eq!(config.classifier.max_concurrency, 4);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.rules.rules.len(), 1);
        assert_eq!(config.rules.rules[0].category, PrivacyCategory::DirectIdentifier);
        assert_eq!(config.cache.max_entries, 10_000);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let error = PrivSurveyConfig::from_toml_str("[classifier]\nbatch_size = 0\n").unwrap_err();
        assert!(matches!(error, PrivSurveyError::Configuration { .. }));
        assert!(error.to_string().contains("batch_size"));

        let error = PrivSurveyConfig::from_toml_str("[cache\n").unwrap_err();
        assert!(matches!(error, PrivSurveyError::Configuration { .. }));
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let result = PrivSurveyConfig::from_toml_str(
            r#"
            [[rules.rule]]
            name = "x"
            name_pattern = "x"
            category = "pii"
            confidence = 0.95
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PrivSurveyConfig::new()
            .with_classifier(ClassifierConfig::new().with_batch_size(7))
            .with_sampling(SamplingConfig::new().with_sample_size(0));
        let rendered = config.to_toml_string().unwrap();
        let parsed = PrivSurveyConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("privsurvey.toml");
        tokio::fs::write(&path, "[sampling]\nsample_size = 3\n")
            .await
            .unwrap();

        let config = PrivSurveyConfig::load(&path).await.unwrap();
        assert_eq!(config.sampling.sample_size, 3);

        let missing = PrivSurveyConfig::load(&dir.path().join("missing.toml")).await;
        assert!(matches!(missing, Err(PrivSurveyError::Io { .. })));
    }
}
