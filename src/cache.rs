//! TTL-bounded store for LLM responses.
//!
//! Keys are SHA-256 digests over the task discriminator and the exact prompt
//! text, so the same SQL sent for two different analyses never collides.
//! Entries older than the TTL read as misses; they are not deleted, only
//! overwritten by the next `put` for the same key. There is no size bound.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock}
};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::{
    config::{CacheBackend, CacheConfig},
    error::{AppResult, file_read_error, file_write_error}
};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key:        String,
    pub payload:    String,
    pub created_at: DateTime<Utc>
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at < ttl
    }
}

/// Response cache interface.
pub trait Cache: Send + Sync {
    /// Fresh payload for `key`, or `None` on miss or expiry.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `payload` under `key`, replacing whatever was there.
    fn put(&self, key: &str, payload: &str) -> AppResult<()>;

    fn ttl(&self) -> Duration;
}

/// Stable cache key for a prompt sent as a given task.
pub fn cache_key(task: &str, system_prompt: &str, user_prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(task.as_bytes());
    hasher.update([0u8]);
    hasher.update(system_prompt.as_bytes());
    hasher.update([0u8]);
    hasher.update(user_prompt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build the cache selected by configuration.
pub fn build_cache(config: &CacheConfig) -> Box<dyn Cache> {
    let secs = i64::try_from(config.ttl_secs)
        .unwrap_or(i64::MAX)
        .min(i64::MAX / 1000);
    let ttl = Duration::seconds(secs);
    if !config.enabled {
        return Box::new(NoCache);
    }
    match config.backend {
        CacheBackend::Memory => Box::new(MemoryCache::new(ttl)),
        CacheBackend::File => Box::new(FileCache::new(&config.directory, ttl))
    }
}

/// Process-local cache.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl:     Duration,
    clock:   Arc<dyn Clock>
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock
        }
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;
        if entry.is_fresh(self.clock.now(), self.ttl) {
            Some(entry.payload.clone())
        } else {
            trace!(key, "stale cache entry");
            None
        }
    }

    fn put(&self, key: &str, payload: &str) -> AppResult<()> {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                key.to_string(),
                CacheEntry {
                    key:        key.to_string(),
                    payload:    payload.to_string(),
                    created_at: self.clock.now()
                }
            );
        }
        Ok(())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// One JSON file per key under a directory; survives between runs.
pub struct FileCache {
    directory: PathBuf,
    ttl:       Duration,
    clock:     Arc<dyn Clock>
}

impl FileCache {
    pub fn new(directory: &Path, ttl: Duration) -> Self {
        Self::with_clock(directory, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(directory: &Path, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            directory: directory.to_path_buf(),
            ttl,
            clock
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.json", key))
    }

    fn read_entry(&self, key: &str) -> AppResult<Option<CacheEntry>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| file_read_error(&path.display().to_string(), e))?;
        Ok(serde_json::from_str(&content).ok())
    }
}

impl Cache for FileCache {
    fn get(&self, key: &str) -> Option<String> {
        match self.read_entry(key) {
            Ok(Some(entry)) if entry.is_fresh(self.clock.now(), self.ttl) => Some(entry.payload),
            Ok(Some(_)) => {
                trace!(key, "stale cache entry");
                None
            }
            Ok(None) => None,
            Err(e) => {
                debug!(key, error = %e, "unreadable cache entry");
                None
            }
        }
    }

    fn put(&self, key: &str, payload: &str) -> AppResult<()> {
        fs::create_dir_all(&self.directory)
            .map_err(|e| file_write_error(&self.directory.display().to_string(), e))?;
        let entry = CacheEntry {
            key:        key.to_string(),
            payload:    payload.to_string(),
            created_at: self.clock.now()
        };
        let path = self.entry_path(key);
        let content = serde_json::to_string_pretty(&entry).unwrap_or_default();
        fs::write(&path, content).map_err(|e| file_write_error(&path.display().to_string(), e))
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Cache that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl Cache for NoCache {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn put(&self, _key: &str, _payload: &str) -> AppResult<()> {
        Ok(())
    }

    fn ttl(&self) -> Duration {
        Duration::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_is_stable() {
        assert_eq!(cache_key("intent", "s", "u"), cache_key("intent", "s", "u"));
        assert_eq!(cache_key("intent", "s", "u").len(), 64);
    }

    #[test]
    fn test_cache_key_separates_fields() {
        assert_ne!(cache_key("intent", "ab", "c"), cache_key("intent", "a", "bc"));
    }

    #[test]
    fn test_entry_freshness_boundary() {
        let created_at = Utc::now();
        let entry = CacheEntry {
            key: "k".into(),
            payload: "p".into(),
            created_at
        };
        let ttl = Duration::seconds(10);
        assert!(entry.is_fresh(created_at + Duration::seconds(9), ttl));
        assert!(!entry.is_fresh(created_at + Duration::seconds(10), ttl));
    }

    #[test]
    fn test_no_cache_always_misses() {
        NoCache.put("k", "v").unwrap();
        assert!(NoCache.get("k").is_none());
    }
}
