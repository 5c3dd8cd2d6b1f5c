use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::{AnalysisResult, Industry};

// Cache entry with timestamp and its own ttl
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub value: AnalysisResult,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
}

/// Create a cache key (hash of normalized subject + industry).
///
/// Subjects differing only in case or surrounding whitespace share a key;
/// they are the same analysis as far as the cache is concerned. The
/// separator byte cannot appear in an industry name, so distinct pairs never
/// hash the same input.
pub fn fingerprint(subject: &str, industry: Industry) -> String {
    let normalized = subject.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update([0u8]);
    hasher.update(industry.as_str().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint-keyed store of computed analyses with per-entry ttl and a
/// hard size bound.
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
    // serialises writers so the size bound holds after every set
    write_lock: Mutex<()>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            write_lock: Mutex::new(()),
        }
    }

    pub fn get(&self, key: &str) -> Option<AnalysisResult> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }
        // re-checked under the shard lock in case a writer refreshed it meanwhile
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    pub fn set(&self, key: String, value: AnalysisResult) {
        self.set_with_ttl(key, value, self.config.default_ttl);
    }

    pub fn set_with_ttl(&self, key: String, value: AnalysisResult, ttl: Duration) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        // overwriting an existing key does not grow the store
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.config.max_entries {
                if !self.evict_oldest() {
                    break;
                }
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    // Removes the entry with the smallest created_at. Ties go to whichever
    // the iteration meets first.
    fn evict_oldest(&self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.created_at)
            .map(|entry| entry.key().clone());

        match oldest {
            Some(key) => {
                tracing::debug!(key = %key, "Evicting oldest cache entry");
                self.entries.remove(&key).is_some()
            }
            None => false,
        }
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            max_size: self.config.max_entries,
        }
    }
}
