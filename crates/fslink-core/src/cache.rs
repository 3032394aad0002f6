//! Execution cache for materialised results.
//!
//! This module maps the fingerprint of a statement to the table that
//! statement produced, so identical statements within a session are only
//! ever executed once.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

use crate::error::Error;
use crate::handle::ResultHandle;

/// Length of the session salt.
const SALT_LEN: usize = 8;

/// Number of hex characters of the fingerprint used in physical names.
const DISPLAY_HASH_LEN: usize = 9;

/// Statement fingerprint for cache lookup.
///
/// The full 256-bit blake3 digest of the statement text followed by the
/// session salt. Only a short prefix is used for table names; the cache is
/// always keyed by the full digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of a statement within a session.
    pub fn of(statement: &str, session_salt: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(statement.as_bytes());
        hasher.update(session_salt.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Full digest as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short prefix used in human-readable table names.
    pub fn short(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(DISPLAY_HASH_LEN);
        s
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheStats {
    /// Get hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(AtomicOrdering::Relaxed)
    }

    /// Get miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(AtomicOrdering::Relaxed)
    }

    /// Get the number of results stored.
    pub fn inserts(&self) -> u64 {
        self.inserts.load(AtomicOrdering::Relaxed)
    }

    /// Get the number of entries removed by invalidation.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(AtomicOrdering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

/// One cache slot. The mutex serialises executions of the same fingerprint.
type Slot = Arc<Mutex<Option<ResultHandle>>>;

/// Session-scoped execution cache.
///
/// Thread-safe. Two concurrent requests for the same fingerprint execute the
/// statement at most once: the second waits on the slot and receives the
/// first request's handle. Entries are never evicted implicitly.
pub struct ExecutionCache {
    /// Random per-session token mixed into every fingerprint.
    salt: String,
    /// Fingerprint -> produced result.
    slots: DashMap<Fingerprint, Slot>,
    /// Physical name -> fingerprint that owns it.
    names: Mutex<HashMap<String, Fingerprint>>,
    /// Cache statistics.
    stats: CacheStats,
}

impl ExecutionCache {
    /// Create a cache with a freshly generated session salt.
    pub fn new() -> Self {
        let salt: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SALT_LEN)
            .map(char::from)
            .collect();
        Self::with_salt(salt)
    }

    /// Create a cache with an explicit session salt.
    pub fn with_salt(salt: impl Into<String>) -> Self {
        Self {
            salt: salt.into(),
            slots: DashMap::new(),
            names: Mutex::new(HashMap::new()),
            stats: CacheStats::default(),
        }
    }

    /// The session salt.
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Fingerprint a statement within this session.
    pub fn fingerprint(&self, statement: &str) -> Fingerprint {
        Fingerprint::of(statement, &self.salt)
    }

    /// Return the cached result for `statement`, or execute and store it.
    ///
    /// `execute` receives the physical name to materialise into. When
    /// `use_cache` is false any cached entry is ignored, but the fresh result
    /// is still stored. Errors from `execute` are returned unchanged and
    /// nothing is stored.
    pub fn get_or_execute<F>(
        &self,
        statement: &str,
        output_role: &str,
        use_cache: bool,
        execute: F,
    ) -> Result<ResultHandle, Error>
    where
        F: FnOnce(&str) -> Result<ResultHandle, Error>,
    {
        let fingerprint = self.fingerprint(statement);
        let slot = Arc::clone(self.slots.entry(fingerprint).or_default().value());

        let mut guard = slot.lock();
        if use_cache {
            if let Some(handle) = guard.as_ref() {
                self.stats.hits.fetch_add(1, AtomicOrdering::Relaxed);
                debug!(
                    templated_name = output_role,
                    physical_name = %handle.physical_name,
                    "using cached result"
                );
                return Ok(handle.clone());
            }
        }
        self.stats.misses.fetch_add(1, AtomicOrdering::Relaxed);

        let physical_name = self.physical_name(output_role, &fingerprint);
        match execute(&physical_name) {
            Ok(handle) => {
                *guard = Some(handle.clone());
                self.stats.inserts.fetch_add(1, AtomicOrdering::Relaxed);
                Ok(handle)
            }
            Err(e) => {
                let empty = guard.is_none();
                drop(guard);
                if empty {
                    self.slots
                        .remove_if(&fingerprint, |_, s| Arc::ptr_eq(s, &slot) && s.lock().is_none());
                }
                Err(e)
            }
        }
    }

    /// Peek at the cached result for a statement without touching statistics.
    pub fn get(&self, statement: &str) -> Option<ResultHandle> {
        let fingerprint = self.fingerprint(statement);
        let slot = self.slots.get(&fingerprint).map(|s| Arc::clone(s.value()))?;
        let guard = slot.lock();
        guard.clone()
    }

    /// Remove every entry that refers to the handle's physical table.
    ///
    /// Several fingerprints may share one physical table, so entries are
    /// matched by value. Returns the number of entries removed.
    pub fn invalidate(&self, handle: &ResultHandle) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| {
            slot.lock()
                .as_ref()
                .map_or(true, |h| h.physical_name != handle.physical_name)
        });
        self.names.lock().remove(&handle.physical_name);

        let removed = before.saturating_sub(self.slots.len());
        self.stats
            .invalidations
            .fetch_add(removed as u64, AtomicOrdering::Relaxed);
        if removed > 0 {
            debug!(physical_name = %handle.physical_name, removed, "invalidated cache entries");
        }
        removed
    }

    /// Every stored result.
    pub fn handles(&self) -> Vec<ResultHandle> {
        self.slots
            .iter()
            .filter_map(|entry| entry.value().lock().clone())
            .collect()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of stored results.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.value().lock().is_some())
            .count()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all cached entries.
    pub fn clear(&self) {
        self.slots.clear();
        self.names.lock().clear();
    }

    /// Physical name for a role and fingerprint.
    ///
    /// `<role>_<9 hex chars>`, with a `_<n>` suffix when another fingerprint
    /// already owns that name.
    fn physical_name(&self, output_role: &str, fingerprint: &Fingerprint) -> String {
        let base = format!("{}_{}", output_role, fingerprint.short());
        let mut names = self.names.lock();

        let mut candidate = base.clone();
        let mut n = 1;
        loop {
            match names.get(&candidate) {
                Some(owner) if owner != fingerprint => {
                    candidate = format!("{}_{}", base, n);
                    n += 1;
                }
                _ => break,
            }
        }
        names.insert(candidate.clone(), *fingerprint);
        candidate
    }
}

impl Default for ExecutionCache {
    fn default() -> Self {
        Self::new()
    }
}
