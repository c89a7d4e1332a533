//! Classification Cache: fingerprint → result memoization.
//!
//! [`FileCache`] keeps entries in a [`DashMap`] so concurrent batch tasks can
//! read and write different fingerprints without contention. Writes to the
//! same fingerprint are last-write-wins. Entries can be persisted to a JSON
//! file between runs; eviction by size or age is the only way an entry is
//! lost.

use super::{ClassificationResult, Fingerprint};
use crate::config::CacheConfig;
use crate::error::CacheError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Version tag of the persisted cache file.
pub const CACHE_FORMAT_VERSION: &str = "1";

/// Memoized classification with its lifetime policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key the entry is stored under
    pub fingerprint: Fingerprint,
    /// Stored with the column of whichever table first produced it
    pub result: ClassificationResult,
    /// When the entry was written; eviction removes the oldest first
    pub created_at: DateTime<Utc>,
    /// Absent when the cache has no maximum age
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Creates an entry, deriving the expiry from an optional maximum age.
    pub fn new(
        fingerprint: Fingerprint,
        result: ClassificationResult,
        created_at: DateTime<Utc>,
        max_age: Option<std::time::Duration>,
    ) -> Self {
        let expires_at = max_age
            .and_then(|age| chrono::Duration::from_std(age).ok())
            .and_then(|age| created_at.checked_add_signed(age));
        Self {
            fingerprint,
            result,
            created_at,
            expires_at,
        }
    }

    /// Whether the entry has expired at the given instant.
    pub fn is_expired_at(&self, instant: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= instant)
    }
}

/// Shared classification memo.
///
/// Implementations must allow concurrent calls from several batch tasks.
/// Errors are never fatal to a run: callers treat a failed lookup as a miss.
pub trait ClassificationCache: Send + Sync {
    /// Returns the stored result for a fingerprint, if present and not expired.
    fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<ClassificationResult>, CacheError>;

    /// Stores a result; a later `lookup` in the same run returns it.
    fn store(&self, fingerprint: Fingerprint, result: ClassificationResult)
    -> Result<(), CacheError>;

    /// Number of entries currently held.
    fn len(&self) -> usize;

    /// True when no entries are held.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes expired entries and returns how many were removed.
    fn purge_expired(&self) -> usize;
}

/// Summary for `cache stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries held, expired ones included
    pub total_entries: usize,
    /// Entries past their expiry at the time the cache was loaded
    pub expired_entries: usize,
    /// Configured size bound
    pub max_entries: usize,
    /// Creation time of the oldest entry
    pub oldest: Option<DateTime<Utc>>,
    /// Creation time of the newest entry
    pub newest: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    format_version: String,
    entries: Vec<CacheEntry>,
}

/// DashMap-backed cache with optional JSON persistence.
pub struct FileCache {
    entries: Arc<DashMap<Fingerprint, CacheEntry>>,
    path: Option<PathBuf>,
    max_entries: usize,
    max_age: Option<std::time::Duration>,
    /// Expiry reference; entries written during this run are never expired
    run_started_at: DateTime<Utc>,
    dirty: AtomicBool,
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("entries", &self.entries.len())
            .field("path", &self.path)
            .field("max_entries", &self.max_entries)
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl FileCache {
    /// Creates an empty cache that is never persisted.
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::empty(None, config, Utc::now())
    }

    fn empty(path: Option<PathBuf>, config: &CacheConfig, now: DateTime<Utc>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            path,
            max_entries: config.max_entries.max(1),
            max_age: config.max_age(),
            run_started_at: now,
            dirty: AtomicBool::new(false),
        }
    }

    /// Loads the cache file named in `config`.
    ///
    /// A missing file yields an empty cache. Expired entries and entries
    /// beyond the size bound are evicted while loading.
    ///
    /// # Errors
    /// Returns [`CacheError`] when the file exists but cannot be read or
    /// parsed. See [`FileCache::open`] for the degrading variant.
    pub async fn load(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::load_at(config, Utc::now(), false).await
    }

    /// Loads the cache file named in `config`, keeping expired entries.
    ///
    /// Used by cache maintenance so [`FileCache::stats`] can count expired
    /// entries and [`ClassificationCache::purge_expired`] can remove them.
    /// Lookups still treat expired entries as misses.
    ///
    /// # Errors
    /// Same as [`FileCache::load`].
    pub async fn load_all(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::load_at(config, Utc::now(), true).await
    }

    async fn load_at(
        config: &CacheConfig,
        now: DateTime<Utc>,
        keep_expired: bool,
    ) -> Result<Self, CacheError> {
        let path = config.path.clone();
        let path_str = path.display().to_string();
        let cache = Self::empty(Some(path.clone()), config, now);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No cache file at {}, starting empty", path_str);
                return Ok(cache);
            }
            Err(source) => {
                return Err(CacheError::Unavailable {
                    path: path_str,
                    source,
                });
            }
        };

        let file: CacheFile =
            serde_json::from_str(&content).map_err(|source| CacheError::Corrupt {
                path: path_str.clone(),
                source,
            })?;
        if file.format_version != CACHE_FORMAT_VERSION {
            return Err(CacheError::UnsupportedVersion {
                path: path_str,
                version: file.format_version,
            });
        }

        let loaded = file.entries.len();
        for entry in file.entries {
            if keep_expired || !entry.is_expired_at(now) {
                cache.entries.insert(entry.fingerprint.clone(), entry);
            }
        }
        cache.evict_down_to(cache.max_entries, None);
        let dropped = loaded.saturating_sub(cache.entries.len());
        if dropped > 0 {
            cache.dirty.store(true, Ordering::Relaxed);
        }

        tracing::info!(
            "Loaded {} cached classifications from {} ({} expired or evicted)",
            cache.entries.len(),
            path_str,
            dropped
        );
        Ok(cache)
    }

    /// Loads the cache, falling back to an empty cache on failure.
    ///
    /// A disabled cache is in-memory only. A corrupt or unreadable file is
    /// logged as a warning and will be overwritten on the next save.
    pub async fn open(config: &CacheConfig) -> Self {
        if !config.enabled {
            tracing::debug!("Persistent cache disabled; using in-memory cache");
            return Self::in_memory(config);
        }
        match Self::load(config).await {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!("{}; continuing with an empty cache", e);
                Self::empty(Some(config.path.clone()), config, Utc::now())
            }
        }
    }

    /// Writes all entries to the cache file atomically.
    ///
    /// Does nothing for in-memory caches. The file is written to a sibling
    /// temporary path and renamed into place, so a crash never leaves a
    /// partially written cache behind.
    pub async fn save(&self) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let path_str = path.display().to_string();

        let mut entries: Vec<CacheEntry> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        let file = CacheFile {
            format_version: CACHE_FORMAT_VERSION.to_string(),
            entries,
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|source| CacheError::Corrupt {
            path: path_str.clone(),
            source,
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CacheError::Unavailable {
                    path: path_str.clone(),
                    source,
                })?;
        }

        let tmp = temp_path(path);
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|source| CacheError::Unavailable {
                path: tmp.display().to_string(),
                source,
            })?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|source| CacheError::Unavailable {
                path: path_str.clone(),
                source,
            })?;

        self.dirty.store(false, Ordering::Relaxed);
        tracing::info!("Saved {} cached classifications to {}", file.entries.len(), path_str);
        Ok(())
    }

    /// Whether entries changed since load or the last save.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    /// Cache file location, if persistent.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.dirty.store(true, Ordering::Relaxed);
        }
    }

    /// Entry statistics relative to the run start.
    pub fn stats(&self) -> CacheStats {
        let mut expired = 0;
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut newest: Option<DateTime<Utc>> = None;
        for entry in self.entries.iter() {
            let entry = entry.value();
            if entry.is_expired_at(self.run_started_at) {
                expired += 1;
            }
            oldest = Some(oldest.map_or(entry.created_at, |o| o.min(entry.created_at)));
            newest = Some(newest.map_or(entry.created_at, |n| n.max(entry.created_at)));
        }
        CacheStats {
            total_entries: self.entries.len(),
            expired_entries: expired,
            max_entries: self.max_entries,
            oldest,
            newest,
        }
    }

    /// Size a full cache is trimmed to, leaving headroom so that the next
    /// stores do not each trigger a scan.
    fn low_watermark(&self) -> usize {
        self.max_entries - self.max_entries / 10
    }

    /// Evicts the oldest entries until at most `target` remain.
    ///
    /// `keep` is never evicted; it protects the entry that was just stored.
    /// One pass selects every victim, so the cost is linear in the cache size.
    fn evict_down_to(&self, target: usize, keep: Option<&Fingerprint>) -> usize {
        let excess = self.entries.len().saturating_sub(target);
        if excess == 0 {
            return 0;
        }

        let mut candidates: Vec<(DateTime<Utc>, Fingerprint)> = self
            .entries
            .iter()
            .filter(|e| Some(e.key()) != keep)
            .map(|e| (e.value().created_at, e.key().clone()))
            .collect();
        let excess = excess.min(candidates.len());
        if excess == 0 {
            return 0;
        }
        if excess < candidates.len() {
            candidates.select_nth_unstable_by_key(excess - 1, |(created_at, _)| *created_at);
        }

        let mut evicted = 0;
        for (_, key) in candidates.iter().take(excess) {
            if self.entries.remove(key).is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::debug!("Evicted {} cache entries over the size bound", evicted);
        }
        evicted
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "cache.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

impl ClassificationCache for FileCache {
    fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<ClassificationResult>, CacheError> {
        Ok(self
            .entries
            .get(fingerprint)
            .filter(|entry| !entry.is_expired_at(self.run_started_at))
            .map(|entry| entry.result.clone()))
    }

    fn store(
        &self,
        fingerprint: Fingerprint,
        result: ClassificationResult,
    ) -> Result<(), CacheError> {
        let created_at = Utc::now().max(self.run_started_at);
        let entry = CacheEntry::new(fingerprint.clone(), result, created_at, self.max_age);
        self.entries.insert(fingerprint.clone(), entry);
        self.dirty.store(true, Ordering::Relaxed);
        if self.entries.len() > self.max_entries {
            self.evict_down_to(self.low_watermark(), Some(&fingerprint));
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let now = self.run_started_at;
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.dirty.store(true, Ordering::Relaxed);
        }
        removed
    }
}
