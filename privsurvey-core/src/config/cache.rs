//! Classification cache configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Thirty days.
const DEFAULT_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

/// Size and age bounds plus persistence location for the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Persist entries between runs
    pub enabled: bool,
    /// Cache file location
    pub path: PathBuf,
    /// Maximum number of entries; oldest entries are evicted first
    pub max_entries: usize,
    /// Maximum entry age in seconds; `None` keeps entries indefinitely
    pub max_age_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from(".privsurvey/cache.json"),
            max_entries: 10_000,
            max_age_secs: Some(DEFAULT_MAX_AGE_SECS),
        }
    }
}

impl CacheConfig {
    /// Creates a new cache config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to enable/disable persistence.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder method to set the cache file.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Builder method to set the size bound.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Builder method to set the age bound.
    pub fn with_max_age_secs(mut self, secs: Option<u64>) -> Self {
        self.max_age_secs = secs;
        self
    }

    /// Age bound as a duration.
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_entries == 0 {
            return Err("cache.max_entries must be at least 1".to_string());
        }
        if self.max_age_secs == Some(0) {
            return Err("cache.max_age_secs must be at least 1 when set".to_string());
        }
        Ok(())
    }
}
