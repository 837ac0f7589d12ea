//! Reference cache: a bounded, time-expiring map from natural-key hashes to
//! surrogate ids.
//!
//! Wraps the find-or-create calls for the low-cardinality reference entities
//! (System, Version, RecordKind, Coding). The cache is an optimization, not a
//! mutex: a miss falls through to the conflict-safe upsert, so correctness
//! never depends on it. SystemRecord lookups deliberately bypass it (high
//! cardinality, little reuse).
//!
//! Entries produced inside a transaction are staged in a [`StagedCache`] and
//! published only after commit; a rolled-back write can therefore never
//! poison the cache with an id that does not exist.

use std::{
  cell::RefCell,
  collections::HashMap,
  sync::{Arc, Mutex},
  time::{Duration, Instant},
};

use rusqlite::types::Value;
use sha2::{Digest, Sha256};

// ─── Keys ────────────────────────────────────────────────────────────────────

/// A cache key: the entity's table identity plus a content hash of its
/// sorted natural-key column/value pairs. The table prefix keeps distinct
/// entities with identical key payloads from colliding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  table: &'static str,
  hash:  String,
}

impl CacheKey {
  pub fn new(table: &'static str, key: &[(&'static str, Value)]) -> Self {
    let mut parts: Vec<(&str, String)> =
      key.iter().map(|(col, val)| (*col, render_value(val))).collect();
    parts.sort();

    let mut hasher = Sha256::new();
    for (col, val) in &parts {
      hasher.update(col.as_bytes());
      hasher.update(b"=");
      hasher.update(val.as_bytes());
      hasher.update(b"\n");
    }
    CacheKey { table, hash: hex::encode(hasher.finalize()) }
  }
}

fn render_value(value: &Value) -> String {
  match value {
    Value::Null => "null".to_string(),
    Value::Integer(i) => i.to_string(),
    Value::Real(r) => r.to_string(),
    Value::Text(t) => t.clone(),
    Value::Blob(b) => hex::encode(b),
  }
}

// ─── Cache ───────────────────────────────────────────────────────────────────

struct Entry {
  value:      String,
  expires_at: Instant,
  last_used:  u64,
}

struct Inner {
  map:  HashMap<CacheKey, Entry>,
  tick: u64,
}

/// Process-wide reference cache. Cloning is cheap; all clones share the same
/// entries. Constructed at bootstrap and injected into the store.
#[derive(Clone)]
pub struct RefCache {
  inner:       Arc<Mutex<Inner>>,
  capacity:    usize,
  default_ttl: Duration,
}

impl RefCache {
  pub fn new(capacity: usize, default_ttl: Duration) -> Self {
    RefCache {
      inner: Arc::new(Mutex::new(Inner { map: HashMap::new(), tick: 0 })),
      capacity,
      default_ttl,
    }
  }

  pub fn default_ttl(&self) -> Duration {
    self.default_ttl
  }

  pub fn get(&self, key: &CacheKey) -> Option<String> {
    let mut inner = self.inner.lock().expect("cache mutex poisoned");
    inner.tick += 1;
    let tick = inner.tick;
    let expired =
      inner.map.get(key).is_some_and(|e| e.expires_at <= Instant::now());
    if expired {
      inner.map.remove(key);
      return None;
    }
    let entry = inner.map.get_mut(key)?;
    entry.last_used = tick;
    Some(entry.value.clone())
  }

  pub fn set(&self, key: CacheKey, value: String, ttl: Duration) {
    if self.capacity == 0 {
      return;
    }
    let mut inner = self.inner.lock().expect("cache mutex poisoned");
    inner.tick += 1;
    let tick = inner.tick;
    if !inner.map.contains_key(&key) && inner.map.len() >= self.capacity {
      evict_one(&mut inner);
    }
    inner.map.insert(key, Entry {
      value,
      expires_at: Instant::now() + ttl,
      last_used: tick,
    });
  }

  pub fn delete(&self, key: &CacheKey) {
    let mut inner = self.inner.lock().expect("cache mutex poisoned");
    inner.map.remove(key);
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.inner.lock().expect("cache mutex poisoned").map.len()
  }
}

/// Drop one entry to make room: any expired entry first, otherwise the least
/// recently used one. Linear scan — the cache is small by construction.
fn evict_one(inner: &mut Inner) {
  let now = Instant::now();
  if let Some(key) = inner
    .map
    .iter()
    .find(|(_, e)| e.expires_at <= now)
    .map(|(k, _)| k.clone())
  {
    inner.map.remove(&key);
    return;
  }
  if let Some(key) = inner
    .map
    .iter()
    .min_by_key(|(_, e)| e.last_used)
    .map(|(k, _)| k.clone())
  {
    inner.map.remove(&key);
  }
}

// ─── Staged view ─────────────────────────────────────────────────────────────

/// Transaction-scoped view over a [`RefCache`].
///
/// Reads see both the live cache and entries staged during this transaction;
/// writes are buffered and only published by [`publish`](Self::publish) after
/// the transaction commits. Dropping the stage (rollback, retry, error)
/// discards them.
pub struct StagedCache {
  cache:   RefCache,
  pending: RefCell<Vec<(CacheKey, String)>>,
}

impl StagedCache {
  pub fn new(cache: RefCache) -> Self {
    StagedCache { cache, pending: RefCell::new(Vec::new()) }
  }

  pub fn get(&self, key: &CacheKey) -> Option<String> {
    if let Some((_, v)) =
      self.pending.borrow().iter().rev().find(|(k, _)| k == key)
    {
      return Some(v.clone());
    }
    self.cache.get(key)
  }

  pub fn stage(&self, key: CacheKey, value: String) {
    self.pending.borrow_mut().push((key, value));
  }

  /// Publish all staged entries into the live cache. Call after commit only.
  pub fn publish(self) {
    let ttl = self.cache.default_ttl();
    for (key, value) in self.pending.into_inner() {
      self.cache.set(key, value, ttl);
    }
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn key(n: i64) -> CacheKey {
    CacheKey::new("t", &[("id", Value::Integer(n))])
  }

  #[test]
  fn get_set_delete() {
    let cache = RefCache::new(8, Duration::from_secs(60));
    assert!(cache.get(&key(1)).is_none());
    cache.set(key(1), "a".into(), Duration::from_secs(60));
    assert_eq!(cache.get(&key(1)).as_deref(), Some("a"));
    cache.delete(&key(1));
    assert!(cache.get(&key(1)).is_none());
  }

  #[test]
  fn expired_entries_are_misses() {
    let cache = RefCache::new(8, Duration::from_secs(60));
    cache.set(key(1), "a".into(), Duration::ZERO);
    assert!(cache.get(&key(1)).is_none());
  }

  #[test]
  fn capacity_evicts_least_recently_used() {
    let cache = RefCache::new(2, Duration::from_secs(60));
    cache.set(key(1), "a".into(), Duration::from_secs(60));
    cache.set(key(2), "b".into(), Duration::from_secs(60));
    // Touch 1 so 2 becomes the LRU victim.
    cache.get(&key(1));
    cache.set(key(3), "c".into(), Duration::from_secs(60));
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&key(1)).as_deref(), Some("a"));
    assert!(cache.get(&key(2)).is_none());
    assert_eq!(cache.get(&key(3)).as_deref(), Some("c"));
  }

  #[test]
  fn distinct_tables_never_collide() {
    let a = CacheKey::new("a", &[("id", Value::Integer(1))]);
    let b = CacheKey::new("b", &[("id", Value::Integer(1))]);
    assert_ne!(a, b);
  }

  #[test]
  fn key_is_order_insensitive() {
    let a = CacheKey::new("t", &[
      ("x", Value::Text("1".into())),
      ("y", Value::Text("2".into())),
    ]);
    let b = CacheKey::new("t", &[
      ("y", Value::Text("2".into())),
      ("x", Value::Text("1".into())),
    ]);
    assert_eq!(a, b);
  }

  #[test]
  fn staged_entries_invisible_until_publish() {
    let cache = RefCache::new(8, Duration::from_secs(60));
    let staged = StagedCache::new(cache.clone());
    staged.stage(key(1), "a".into());
    assert_eq!(staged.get(&key(1)).as_deref(), Some("a"));
    assert!(cache.get(&key(1)).is_none());
    staged.publish();
    assert_eq!(cache.get(&key(1)).as_deref(), Some("a"));
  }

  #[test]
  fn dropped_stage_leaves_no_trace() {
    let cache = RefCache::new(8, Duration::from_secs(60));
    {
      let staged = StagedCache::new(cache.clone());
      staged.stage(key(1), "a".into());
    }
    assert!(cache.get(&key(1)).is_none());
  }
}
