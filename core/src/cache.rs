//! Result cache: memoizes aggregate results by key with TTL eviction.
//!
//! RULE: A value is written only after its computation returns `Ok`.
//! A failed or abandoned computation never leaves an entry behind.
//!
//! Entries carry their own `TtlPolicy`. The moka-backed cache applies it
//! through an `Expiry` policy: absolute expiration counts from the write,
//! sliding expiration restarts on every read, and whichever is sooner wins.

use crate::{
    config::TtlPolicy,
    error::{AnalyticsError, AnalyticsResult},
};
use moka::{sync::Cache, Expiry};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Maximum cached results.
const MAX_ENTRIES: u64 = 10_000;

/// Keys longer than this are shortened in log lines.
const LOG_KEY_CHARS: usize = 120;

// ── Keys ─────────────────────────────────────────────────────────────────────

/// `op|name=value|name=value...`. Every input that changes the result
/// must be a part, or two different queries will share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(operation: &str) -> Self {
        Self(operation.to_string())
    }

    pub fn part(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.0.push('|');
        self.0.push_str(name);
        self.0.push('=');
        self.0.push_str(&value.to_string());
        self
    }

    /// Append a structured value in its JSON form.
    pub fn json<T: Serialize>(self, name: &str, value: &T) -> AnalyticsResult<Self> {
        let encoded = serde_json::to_string(value)?;
        Ok(self.part(name, encoded))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key as written to logs. Long keys keep their prefix and length.
    pub fn for_log(&self) -> String {
        match self.0.char_indices().nth(LOG_KEY_CHARS) {
            Some((cut, _)) => format!("{}...(len={})", &self.0[..cut], self.0.len()),
            None => self.0.clone(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── CacheLayer ───────────────────────────────────────────────────────────────

pub trait CacheLayer: Send + Sync {
    fn get(&self, key: &CacheKey) -> AnalyticsResult<Option<Value>>;

    fn set(&self, key: &CacheKey, value: Value, policy: TtlPolicy) -> AnalyticsResult<()>;

    fn invalidate_all(&self) -> AnalyticsResult<()>;

    /// Return the cached value, or run `init` and cache its result.
    ///
    /// The default is get → compute → set. Concurrent misses on one key
    /// may each compute; the last write wins.
    fn get_or_try_insert(
        &self,
        key: &CacheKey,
        policy: TtlPolicy,
        init: &mut dyn FnMut() -> AnalyticsResult<Value>,
    ) -> AnalyticsResult<Value> {
        if let Some(hit) = self.get(key)? {
            return Ok(hit);
        }
        let value = init()?;
        self.set(key, value.clone(), policy)?;
        Ok(value)
    }
}

/// Run `compute` through `cache` under `key`.
///
/// On a miss the freshly computed value is returned as-is; on a hit the
/// cached JSON is decoded back into `T`.
pub fn memoize<T, F>(
    cache: &dyn CacheLayer,
    key: &CacheKey,
    policy: TtlPolicy,
    compute: F,
) -> AnalyticsResult<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> AnalyticsResult<T>,
{
    let mut compute = Some(compute);
    let mut fresh: Option<T> = None;

    let value = cache.get_or_try_insert(key, policy, &mut || {
        let f = compute.take().ok_or_else(|| {
            AnalyticsError::Other(anyhow::anyhow!("cache initializer for {key} ran twice"))
        })?;
        let out = f()?;
        let encoded = serde_json::to_value(&out)?;
        fresh = Some(out);
        Ok(encoded)
    })?;

    match fresh {
        Some(out) => {
            log::debug!("cache: miss key={}", key.for_log());
            Ok(out)
        }
        None => {
            log::debug!("cache: hit key={}", key.for_log());
            Ok(serde_json::from_value(value)?)
        }
    }
}

// ── Moka ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CachedEntry {
    value:  Value,
    policy: TtlPolicy,
}

struct CombinedExpiry;

impl CombinedExpiry {
    fn initial(policy: &TtlPolicy) -> Duration {
        policy.absolute.min(policy.sliding)
    }
}

impl Expiry<String, CachedEntry> for CombinedExpiry {
    fn expire_after_create(&self, _key: &String, entry: &CachedEntry, _created_at: Instant) -> Option<Duration> {
        Some(Self::initial(&entry.policy))
    }

    fn expire_after_read(
        &self,
        _key: &String,
        entry: &CachedEntry,
        read_at: Instant,
        _duration_until_expiry: Option<Duration>,
        last_modified_at: Instant,
    ) -> Option<Duration> {
        let age = read_at.saturating_duration_since(last_modified_at);
        let absolute_left = entry.policy.absolute.saturating_sub(age);
        Some(entry.policy.sliding.min(absolute_left))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &CachedEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(Self::initial(&entry.policy))
    }
}

/// In-process cache with per-entry expiry and single-flight initialization:
/// concurrent misses on one key run the computation once and share the
/// outcome, including its error.
pub struct MokaCache {
    inner:  Cache<String, CachedEntry>,
    hits:   AtomicU64,
    misses: AtomicU64,
}

impl MokaCache {
    pub fn new() -> Self {
        Self::with_capacity(MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(CombinedExpiry)
            .build();
        Self { inner, hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for MokaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheLayer for MokaCache {
    fn get(&self, key: &CacheKey) -> AnalyticsResult<Option<Value>> {
        Ok(self.inner.get(key.as_str()).map(|e| e.value))
    }

    fn set(&self, key: &CacheKey, value: Value, policy: TtlPolicy) -> AnalyticsResult<()> {
        self.inner.insert(key.as_str().to_string(), CachedEntry { value, policy });
        Ok(())
    }

    fn invalidate_all(&self) -> AnalyticsResult<()> {
        self.inner.invalidate_all();
        Ok(())
    }

    fn get_or_try_insert(
        &self,
        key: &CacheKey,
        policy: TtlPolicy,
        init: &mut dyn FnMut() -> AnalyticsResult<Value>,
    ) -> AnalyticsResult<Value> {
        if let Some(entry) = self.inner.get(key.as_str()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.value);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.inner
            .try_get_with(key.as_str().to_string(), || {
                init().map(|value| CachedEntry { value, policy })
            })
            .map(|entry| entry.value)
            .map_err(AnalyticsError::Shared)
    }
}
