//! Per-node metric store.
//!
//! This crate implements the node side of the Wisp protocol:
//!
//! - [`series`] — the opaque on-disk series codec, gap-fill merge, and
//!   range slicing.
//! - [`SeriesBackend`] / [`FileBackend`] — storage of one file per metric
//!   under a Graphite-style directory layout.
//! - [`InventoryCache`] — the `Cold → Building → Ready` listing cache with
//!   single-flight rebuild scans.
//! - [`MetricStore`] — the service tying it together: listing, stat,
//!   file-level CRUD, non-destructive backfill, and raw timeseries
//!   read/write, with per-key write serialization.

mod backend;
mod error;
mod inventory;
pub mod series;
mod store;

pub use backend::{FileBackend, SeriesBackend};
pub use error::StoreError;
pub use inventory::{CacheState, InventoryCache};
pub use store::{ListFilter, MetricStore};
