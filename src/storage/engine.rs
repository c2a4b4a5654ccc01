//! Storage Engine
//!
//! A nested mapping of user -> key -> [`Entry`], guarded by one mutex that
//! every session and the reaper share.
//!
//! ## Consistency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │                  Mutex<HashMap<user, …>>                    │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐         │
//! │  │ Keyspace "a" │ │ Keyspace "b" │ │ Keyspace ... │         │
//! │  │ key -> Entry │ │ key -> Entry │ │ key -> Entry │         │
//! │  └──────────────┘ └──────────────┘ └──────────────┘         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callers never hold the lock themselves. [`StorageEngine::with_keyspace`]
//! locks once, hands out the caller's [`Keyspace`], and unlocks when the
//! closure returns, so a command's whole check-then-mutate sequence is one
//! critical section. The [`Keyspace`] methods are the already-locked
//! operations those closures are built from.
//!
//! ## Expiry
//!
//! Dead entries are removed in two ways: the reaper sweeps every keyspace
//! periodically, and any lookup that lands on a dead entry drops it on the
//! spot. Either way an entry is never visible at or after its death time.

use crate::config::DEFAULT_TTL;
use crate::storage::value::{Entry, SelectorError, Value, ValueKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a storage operation could not be carried out.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The key holds a different variant than the operation needs
    #[error("key holds a {actual}, operation needs a {expected}")]
    WrongType {
        expected: ValueKind,
        actual: ValueKind,
    },

    /// The key does not exist
    #[error("key does not exist")]
    NoKey,

    /// The selector does not address anything in the value
    #[error(transparent)]
    Selector(#[from] SelectorError),
}

/// One user's key -> entry mapping.
///
/// Only reachable through [`StorageEngine::with_keyspace`], so every method
/// here runs with the engine lock held.
#[derive(Debug, Default)]
pub struct Keyspace {
    entries: HashMap<String, Entry>,
    /// Dead entries dropped on access rather than by the reaper
    lazily_evicted: u64,
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a live entry, dropping it if it has died.
    pub fn lookup(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_dead_at(now)) {
            self.entries.remove(key);
            self.lazily_evicted += 1;
            return None;
        }
        self.entries.get_mut(key)
    }

    /// Inserts an entry, replacing whatever the key held.
    pub fn insert(&mut self, key: impl Into<String>, entry: Entry) -> Option<Entry> {
        self.entries.insert(key.into(), entry)
    }

    /// Removes a live entry. Returns `None` if the key was absent or dead.
    pub fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        if entry.is_dead() {
            self.lazily_evicted += 1;
            return None;
        }
        Some(entry)
    }

    /// Keys of all live entries, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_dead_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Number of stored entries, including dead ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads the part of a `kind` value addressed by `selector`.
    ///
    /// Never creates anything: an absent key is `NoKey`, another variant is
    /// `WrongType`.
    pub fn read(&mut self, key: &str, kind: ValueKind, selector: &str) -> Result<String, StoreError> {
        let entry = self.lookup(key).ok_or(StoreError::NoKey)?;
        check_kind(entry, kind)?;
        Ok(entry.value().get(selector)?)
    }

    /// Writes into an existing `kind` value in place.
    ///
    /// Like [`Keyspace::read`], this never creates or replaces an entry.
    pub fn update(
        &mut self,
        key: &str,
        kind: ValueKind,
        content: String,
        selector: &str,
    ) -> Result<(), StoreError> {
        let entry = self.lookup(key).ok_or(StoreError::NoKey)?;
        check_kind(entry, kind)?;
        Ok(entry.value_mut().set(content, selector)?)
    }

    /// Writes into a `kind` value, creating it when needed.
    ///
    /// A live entry of the same variant is mutated in place and keeps its
    /// death time. An absent key, or one holding another variant, gets a
    /// brand new entry dying `ttl` from now.
    pub fn upsert(
        &mut self,
        key: &str,
        kind: ValueKind,
        content: String,
        selector: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        if let Some(entry) = self.lookup(key) {
            if entry.kind() == kind {
                return Ok(entry.value_mut().set(content, selector)?);
            }
        }

        let mut value = Value::empty(kind);
        value.set(content, selector)?;
        self.entries.insert(key.to_string(), Entry::new(value, ttl));
        Ok(())
    }

    /// Drops every entry dead at `now`, returning how many were dropped.
    fn evict_dead(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_dead_at(now));
        before - self.entries.len()
    }
}

fn check_kind(entry: &Entry, expected: ValueKind) -> Result<(), StoreError> {
    let actual = entry.kind();
    if actual != expected {
        return Err(StoreError::WrongType { expected, actual });
    }
    Ok(())
}

/// Storage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageStats {
    /// Number of keyspaces (users)
    pub keyspaces: usize,
    /// Stored entries, including dead ones not yet swept
    pub entries: usize,
    /// Entries removed after their death time, by the reaper or on access
    pub expired: u64,
}

/// The storage engine shared by all sessions and the reaper.
///
/// # Example
///
/// ```
/// use potatokv::storage::{StorageEngine, ValueKind};
/// use std::time::Duration;
///
/// let engine = StorageEngine::new(Duration::from_secs(60));
///
/// let value = engine.with_keyspace("user", |ks| {
///     ks.upsert("list", ValueKind::List, "a".to_string(), "-1", engine.default_ttl())?;
///     ks.read("list", ValueKind::List, "0")
/// });
/// assert_eq!(value.unwrap(), "a");
/// ```
#[derive(Debug)]
pub struct StorageEngine {
    keyspaces: Mutex<HashMap<String, Keyspace>>,

    /// TTL used when a command carries no override
    default_ttl: Duration,

    /// Entries removed by the reaper
    swept_count: AtomicU64,
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl StorageEngine {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            keyspaces: Mutex::new(HashMap::new()),
            default_ttl,
            swept_count: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Resolves a command's TTL override against the server default.
    pub fn ttl_for(&self, ttl_override: Option<Duration>) -> Duration {
        ttl_override.unwrap_or(self.default_ttl)
    }

    /// Every critical section leaves the maps consistent, so a panic while
    /// the lock was held does not invalidate the data.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Keyspace>> {
        self.keyspaces.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes sure a keyspace exists for `user`.
    pub fn open_keyspace(&self, user: &str) {
        self.lock().entry(user.to_string()).or_default();
    }

    /// Runs `f` on `user`'s keyspace under a single lock acquisition.
    pub fn with_keyspace<R>(&self, user: &str, f: impl FnOnce(&mut Keyspace) -> R) -> R {
        let mut keyspaces = self.lock();
        f(keyspaces.entry(user.to_string()).or_default())
    }

    /// Returns a copy of a live entry.
    pub fn lookup(&self, user: &str, key: &str) -> Option<Entry> {
        self.with_keyspace(user, |ks| ks.lookup(key).cloned())
    }

    /// Inserts or replaces an entry.
    pub fn insert(&self, user: &str, key: impl Into<String>, entry: Entry) {
        self.with_keyspace(user, |ks| {
            ks.insert(key, entry);
        });
    }

    /// Deletes a key. Returns `true` if a live entry was removed.
    pub fn delete(&self, user: &str, key: &str) -> bool {
        self.with_keyspace(user, |ks| ks.remove(key).is_some())
    }

    /// Keys of `user`'s live entries, sorted.
    pub fn keys(&self, user: &str) -> Vec<String> {
        self.with_keyspace(user, |ks| ks.keys())
    }

    /// Total stored entries across users, including unswept dead ones.
    pub fn len(&self) -> usize {
        self.lock().values().map(Keyspace::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry whose death time has passed.
    ///
    /// This is a full scan over all users and keys, called by the reaper.
    ///
    /// # Returns
    ///
    /// Returns the number of entries that were removed.
    pub fn cleanup_expired(&self) -> u64 {
        let now = Instant::now();
        let cleaned: u64 = self
            .lock()
            .values_mut()
            .map(|ks| ks.evict_dead(now) as u64)
            .sum();

        if cleaned > 0 {
            self.swept_count.fetch_add(cleaned, Ordering::Relaxed);
        }
        cleaned
    }

    /// Returns storage statistics.
    pub fn stats(&self) -> StorageStats {
        let keyspaces = self.lock();
        StorageStats {
            keyspaces: keyspaces.len(),
            entries: keyspaces.values().map(Keyspace::len).sum(),
            expired: self.swept_count.load(Ordering::Relaxed)
                + keyspaces.values().map(|ks| ks.lazily_evicted).sum::<u64>(),
        }
    }
}
