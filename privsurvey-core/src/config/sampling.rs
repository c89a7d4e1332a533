//! Sample digest configuration for database schema readers.

use serde::{Deserialize, Serialize};

/// Largest sample a reader may take per column.
pub const MAX_SAMPLE_SIZE: u32 = 100;

/// Controls the bounded per-column sample that readers reduce to a digest.
///
/// Sample values are never stored; only the shape digest survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Values read per column; 0 disables sampling
    pub sample_size: u32,
    /// Query timeout in seconds
    pub query_timeout_secs: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_size: 5,
            query_timeout_secs: 30,
        }
    }
}

impl SamplingConfig {
    /// Creates a new sampling config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the sample size.
    pub fn with_sample_size(mut self, sample_size: u32) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Builder method to set the query timeout.
    pub fn with_query_timeout_secs(mut self, secs: u64) -> Self {
        self.query_timeout_secs = secs;
        self
    }

    /// Whether readers should sample at all.
    pub fn is_enabled(&self) -> bool {
        self.sample_size > 0
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_size > MAX_SAMPLE_SIZE {
            return Err(format!(
                "sampling.sample_size must be at most {}, got {}",
                MAX_SAMPLE_SIZE, self.sample_size
            ));
        }
        if self.query_timeout_secs == 0 {
            return Err("sampling.query_timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_config() {
        let config = SamplingConfig::default();
        assert_eq!(config.sample_size, 5);
        assert!(config.is_enabled());
        assert!(config.validate().is_ok());

        assert!(!SamplingConfig::new().with_sample_size(0).is_enabled());
        assert!(SamplingConfig::new().with_sample_size(1000).validate().is_err());
        assert!(SamplingConfig::new().with_query_timeout_secs(0).validate().is_err());
    }
}
