//! Inventory cache: the node-local index of stored metric keys.
//!
//! The cache exists so listing/matching queries do not pay for a full
//! filesystem scan per request. It is guarded by an explicit state machine:
//!
//! ```text
//! Cold --(scan requested)--> Building --(scan completes)--> Ready
//! Ready --(forced rebuild)--> Building
//! ```
//!
//! A scan can take longer than a typical client timeout, so requests that
//! arrive while one is in flight get an explicit "retry later" signal
//! instead of blocking. At most one scan runs at a time (single-flight);
//! concurrent triggers during `Building` are ignored.
//!
//! All operations take a single short lock around pure in-memory work; the
//! scan itself runs outside the lock and reports back through
//! [`InventoryCache::complete_scan`].

use std::sync::Mutex;

use tracing::{debug, warn};

/// Build state of the inventory cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No scan has run yet; the cache holds nothing.
    Cold,
    /// A scan is in flight; listings are unavailable.
    Building,
    /// The cache holds a complete listing.
    Ready,
}

/// Thread-safe inventory cache with single-flight rebuild.
pub struct InventoryCache {
    inner: Mutex<Inner>,
}

/// A mutation observed while a scan was in flight.
///
/// The scan may already have walked past (or not yet reached) the affected
/// key, so these are replayed on top of the scan result.
enum Pending {
    Insert(String),
    Remove(String),
}

struct Inner {
    state: CacheState,
    /// Sorted metric keys; meaningful only in `Ready`.
    entries: Vec<String>,
    /// Mutations received during `Building`, in receipt order.
    pending: Vec<Pending>,
}

impl InventoryCache {
    /// Create a cold cache.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CacheState::Cold,
                entries: Vec::new(),
                pending: Vec::new(),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> CacheState {
        self.inner.lock().expect("inventory lock poisoned").state
    }

    /// Try to claim the scan flight.
    ///
    /// Returns `true` if the caller won and must run the scan (state moved
    /// to `Building`). Returns `false` when a scan is already in flight.
    pub fn begin_scan(&self) -> bool {
        let mut inner = self.inner.lock().expect("inventory lock poisoned");
        match inner.state {
            CacheState::Building => false,
            CacheState::Cold | CacheState::Ready => {
                inner.state = CacheState::Building;
                inner.pending.clear();
                debug!("inventory scan started");
                true
            }
        }
    }

    /// Install a completed scan result and move to `Ready`.
    ///
    /// Entries are sorted here so every listing observes one canonical
    /// order. Mutations that raced the scan are replayed on top of its
    /// result, in receipt order, so a put or delete landing mid-scan is
    /// reflected no matter which side of the walk it fell on.
    pub fn complete_scan(&self, mut entries: Vec<String>) {
        entries.sort();
        let mut inner = self.inner.lock().expect("inventory lock poisoned");
        inner.entries = entries;
        for op in std::mem::take(&mut inner.pending) {
            match op {
                Pending::Insert(key) => insert_sorted(&mut inner.entries, &key),
                Pending::Remove(key) => remove_sorted(&mut inner.entries, &key),
            }
        }
        debug!(metrics = inner.entries.len(), "inventory scan complete");
        inner.state = CacheState::Ready;
    }

    /// Record a failed scan, dropping back to `Cold` so a later request
    /// can retry. Old entries are discarded; a half-scanned listing must
    /// never be served.
    pub fn fail_scan(&self) {
        let mut inner = self.inner.lock().expect("inventory lock poisoned");
        warn!("inventory scan failed, cache reset to cold");
        inner.entries.clear();
        inner.pending.clear();
        inner.state = CacheState::Cold;
    }

    /// Snapshot the listing, or `None` unless the cache is `Ready`.
    pub fn snapshot(&self) -> Option<Vec<String>> {
        let inner = self.inner.lock().expect("inventory lock poisoned");
        match inner.state {
            CacheState::Ready => Some(inner.entries.clone()),
            _ => None,
        }
    }

    /// Record a newly created metric without waiting for the next scan.
    ///
    /// Applied directly in `Ready`; buffered during `Building` (the scan
    /// may already have walked past the key's directory) and replayed by
    /// [`InventoryCache::complete_scan`]. Ignored in `Cold`.
    pub fn insert(&self, key: &str) {
        let mut inner = self.inner.lock().expect("inventory lock poisoned");
        match inner.state {
            CacheState::Ready => insert_sorted(&mut inner.entries, key),
            CacheState::Building => inner.pending.push(Pending::Insert(key.to_string())),
            CacheState::Cold => {}
        }
    }

    /// Drop a deleted metric from the listing.
    ///
    /// Same state handling as [`InventoryCache::insert`].
    pub fn remove(&self, key: &str) {
        let mut inner = self.inner.lock().expect("inventory lock poisoned");
        match inner.state {
            CacheState::Ready => remove_sorted(&mut inner.entries, key),
            CacheState::Building => inner.pending.push(Pending::Remove(key.to_string())),
            CacheState::Cold => {}
        }
    }
}

fn insert_sorted(entries: &mut Vec<String>, key: &str) {
    if let Err(pos) = entries.binary_search_by(|e| e.as_str().cmp(key)) {
        entries.insert(pos, key.to_string());
    }
}

fn remove_sorted(entries: &mut Vec<String>, key: &str) {
    if let Ok(pos) = entries.binary_search_by(|e| e.as_str().cmp(key)) {
        entries.remove(pos);
    }
}

impl Default for InventoryCache {
    fn default() -> Self {
        Self::new()
    }
}
