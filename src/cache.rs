//! TTL cache and rate-limit cooldown markers over a [`KeyValueStore`].
//!
//! Entries are JSON `{"t": <epoch ms>, "payload": ...}`. Cooldown markers
//! live next to the entry they protect, under `<key>:cd`, and hold the
//! expiry instant in epoch milliseconds. The two are independent: a cooldown
//! can be active with no cached entry and the other way round.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, warn};

use crate::error::SheetsError;
use crate::store::KeyValueStore;

/// Suffix appended to a cache key to form its cooldown marker key.
pub const COOLDOWN_SUFFIX: &str = ":cd";

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A cached payload with the instant it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    #[serde(rename = "t")]
    pub timestamp_ms: i64,
    pub payload: T,
}

/// Best-effort cache: reads that fail to parse are misses and writes that
/// fail are logged and dropped.
#[derive(Clone)]
pub struct SheetCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl SheetCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn with_system_clock(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, Arc::new(SystemClock))
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Fresh entry for `key`, if any. `ttl_ms <= 0` always misses.
    pub fn get<T: DeserializeOwned>(&self, key: &str, ttl_ms: i64) -> Option<CacheEntry<T>> {
        if ttl_ms <= 0 {
            return None;
        }
        let raw = self.store.get(key)?;
        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(e) => e,
            Err(e) => {
                debug!(key, error = %e, "ignoring unreadable cache entry");
                return None;
            }
        };
        let age = self.now_ms() - entry.timestamp_ms;
        if age < ttl_ms {
            debug!(key, age_ms = age, "cache hit");
            Some(entry)
        } else {
            debug!(key, age_ms = age, ttl_ms, "cache entry stale");
            None
        }
    }

    /// Store `payload` stamped with the current time. No-op when `ttl_ms <= 0`.
    pub fn put<T: Serialize>(&self, key: &str, ttl_ms: i64, payload: &T) {
        if ttl_ms <= 0 {
            return;
        }
        let entry = CacheEntry {
            timestamp_ms: self.now_ms(),
            payload,
        };
        let json = match serde_json::to_string(&entry) {
            Ok(j) => j,
            Err(e) => {
                warn!(key, error = %e, "could not serialize cache entry");
                return;
            }
        };
        if let Err(e) = self.store.set(key, &json) {
            let e = SheetsError::Persistence(format!("{e:#}"));
            warn!(key, error = %e, "cache write failed; continuing without cache");
        }
    }

    /// Remove every key starting with `prefix` (entries and cooldowns alike).
    pub fn clear_by_prefix(&self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .store
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect();
        for k in &keys {
            self.store.remove(k);
        }
        debug!(prefix, removed = keys.len(), "cleared cache keys");
        keys.len()
    }

    /// Remove the entry for `key` and its cooldown marker.
    pub fn clear_key(&self, key: &str) {
        self.store.remove(key);
        self.store.remove(&cooldown_key(key));
    }

    pub fn cooldown_active(&self, key: &str) -> bool {
        self.store
            .get(&cooldown_key(key))
            .and_then(|v| v.trim().parse::<i64>().ok())
            .is_some_and(|expires_at| self.now_ms() < expires_at)
    }

    /// Suppress fetches for `key` for `duration` from now.
    pub fn set_cooldown(&self, key: &str, duration: Duration) {
        let expires_at = self.now_ms() + duration.as_millis() as i64;
        if let Err(e) = self.store.set(&cooldown_key(key), &expires_at.to_string()) {
            warn!(key, error = %e, "could not record cooldown");
        }
    }
}

pub fn cooldown_key(key: &str) -> String {
    format!("{key}{COOLDOWN_SUFFIX}")
}
