//! The per-node metric store service.
//!
//! [`MetricStore`] ties the series backend, the inventory cache, and the
//! node's own ring view together behind one API that the HTTP layer maps
//! onto endpoints. Mutations of a given metric are serialized by a per-key
//! async lock, so a backfill merge can never interleave with a concurrent
//! write to the same key; different keys proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use regex::Regex;
use tracing::{error, info};
use wisp_types::{MetricStat, RingView, SeriesSlice};

use crate::backend::SeriesBackend;
use crate::error::StoreError;
use crate::inventory::{CacheState, InventoryCache};
use crate::series;

/// Filter applied to a metric listing.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Keep only metrics named in this set.
    pub exact: Option<Vec<String>>,
    /// Keep only metrics matching this regular expression.
    pub pattern: Option<String>,
    /// Discard the current listing and rebuild before serving.
    pub force: bool,
}

/// Node-local metric store.
pub struct MetricStore {
    backend: Arc<dyn SeriesBackend>,
    inventory: InventoryCache,
    view: RingView,
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl MetricStore {
    /// Create a store over the given backend, reporting `view` as this
    /// node's cluster membership.
    pub fn new(backend: Arc<dyn SeriesBackend>, view: RingView) -> Self {
        Self {
            backend,
            inventory: InventoryCache::new(),
            view,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// This node's self-reported ring view.
    pub fn ring_view(&self) -> &RingView {
        &self.view
    }

    /// Current inventory cache state.
    pub fn cache_state(&self) -> CacheState {
        self.inventory.state()
    }

    /// Run an inventory scan in the current task if none is in flight.
    ///
    /// Used at startup to warm the cache before serving.
    pub async fn rebuild_inventory(&self) {
        if !self.inventory.begin_scan() {
            return;
        }
        match self.backend.list().await {
            Ok(keys) => {
                info!(metrics = keys.len(), "inventory rebuilt");
                self.inventory.complete_scan(keys);
            }
            Err(e) => {
                error!(error = %e, "inventory scan failed");
                self.inventory.fail_scan();
            }
        }
    }

    /// Kick off a background inventory scan if none is in flight.
    pub fn trigger_rebuild(self: &Arc<Self>) {
        if self.inventory.state() == CacheState::Building {
            return;
        }
        let store = Arc::clone(self);
        tokio::spawn(async move {
            store.rebuild_inventory().await;
        });
    }

    /// List stored metrics, applying the filter.
    ///
    /// A cold cache (or `force: true`) triggers a background rebuild and
    /// returns [`StoreError::CacheBuilding`] so the caller can retry;
    /// listing never blocks on a scan.
    pub fn list_metrics(self: &Arc<Self>, filter: &ListFilter) -> Result<Vec<String>, StoreError> {
        let pattern = filter
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| StoreError::validation(format!("bad metric pattern: {e}")))?;

        if filter.force {
            self.trigger_rebuild();
            return Err(StoreError::CacheBuilding);
        }

        let Some(mut keys) = self.inventory.snapshot() else {
            self.trigger_rebuild();
            return Err(StoreError::CacheBuilding);
        };

        if let Some(exact) = &filter.exact {
            let wanted: std::collections::BTreeSet<&str> =
                exact.iter().map(String::as_str).collect();
            keys.retain(|k| wanted.contains(k.as_str()));
        }
        if let Some(pattern) = &pattern {
            keys.retain(|k| pattern.is_match(k));
        }
        Ok(keys)
    }

    /// Stat a metric's backing file.
    pub async fn stat_metric(&self, key: &str) -> Result<MetricStat, StoreError> {
        self.backend.stat(key).await
    }

    /// Fetch a metric's raw series file for transfer to a peer.
    ///
    /// Read and stat happen under the per-key lock so the returned pair is
    /// consistent even when a write to the same key races the fetch.
    pub async fn get_metric(&self, key: &str) -> Result<(Bytes, MetricStat), StoreError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;
        let data = self.backend.read(key).await?;
        let stat = self.backend.stat(key).await?;
        Ok((data, stat))
    }

    /// Store a whole series file, replacing any existing data for the key.
    ///
    /// The payload must decode as a series file; opaque as the format is to
    /// peers, a node never persists bytes it cannot read back.
    pub async fn put_metric(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        series::decode(&data).map_err(|e| StoreError::validation(format!("bad series: {e}")))?;

        let lock = self.key_lock(key);
        let _guard = lock.lock().await;
        self.backend.write(key, data).await?;
        self.inventory.insert(key);
        Ok(())
    }

    /// Merge a series file into the stored one, filling gaps only.
    ///
    /// When nothing is stored yet the incoming file is taken as-is.
    /// Populated local slots always survive, so replaying a backfill (or
    /// racing two of them) cannot destroy data.
    pub async fn backfill_metric(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        let incoming = series::decode(&data)
            .map_err(|e| StoreError::validation(format!("bad series: {e}")))?;

        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let merged = match self.backend.read(key).await {
            Ok(existing_bytes) => {
                let existing =
                    series::decode(&existing_bytes).map_err(|e| StoreError::Corrupt {
                        metric: key.to_string(),
                        detail: e.to_string(),
                    })?;
                let merged = series::merge(&existing, &incoming)?;
                series::encode(&merged)?
            }
            Err(StoreError::NotFound(_)) => data,
            Err(e) => return Err(e),
        };

        self.backend.write(key, merged).await?;
        self.inventory.insert(key);
        Ok(())
    }

    /// Delete a metric. Deleting an absent metric is an error.
    pub async fn delete_metric(&self, key: &str) -> Result<(), StoreError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;
        self.backend.delete(key).await?;
        self.inventory.remove(key);
        Ok(())
    }

    /// Write timeseries points directly.
    ///
    /// Unlike backfill, populated incoming slots overwrite stored data;
    /// this is the ingest path, not the migration path. Creates the metric
    /// if absent.
    pub async fn write_points(&self, key: &str, points: SeriesSlice) -> Result<(), StoreError> {
        series::validate(&points)?;

        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let updated = match self.backend.read(key).await {
            Ok(existing_bytes) => {
                let existing =
                    series::decode(&existing_bytes).map_err(|e| StoreError::Corrupt {
                        metric: key.to_string(),
                        detail: e.to_string(),
                    })?;
                series::apply(&existing, &points)?
            }
            Err(StoreError::NotFound(_)) => points,
            Err(e) => return Err(e),
        };

        self.backend.write(key, series::encode(&updated)?).await?;
        self.inventory.insert(key);
        Ok(())
    }

    /// Read timeseries points in `[from, until]`, inclusive.
    ///
    /// `until` defaults to the current time.
    pub async fn read_points(
        &self,
        key: &str,
        from: u64,
        until: Option<u64>,
    ) -> Result<SeriesSlice, StoreError> {
        let data = self.backend.read(key).await?;
        let slice = series::decode(&data).map_err(|e| StoreError::Corrupt {
            metric: key.to_string(),
            detail: e.to_string(),
        })?;
        let until = until.unwrap_or_else(unix_now);
        Ok(series::slice_range(&slice, from, until))
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock().expect("key lock table poisoned");
        Arc::clone(
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
