//! Cluster topology verification and metric placement.
//!
//! Before any placement decision is trusted, every configured node is asked
//! for its own view of ring membership ([`fetch_ring_views`]) and the views
//! are cross-checked ([`is_healthy`]). Routing against a disputed ring may
//! send a write to a node that, under its peers' beliefs, does not own that
//! key — indistinguishable from silent data loss until discovered — so a
//! disagreement is a hard error, never a warning.
//!
//! A single-host override ([`LocateOptions::single_host`]) bypasses the
//! cross-check and treats one node's view as authoritative. It exists for
//! diagnostics and for querying a cluster whose consistency is itself in
//! question.

mod error;
mod placement;
mod source;
mod topology;

#[cfg(test)]
mod tests;

pub use error::ClusterError;
pub use placement::{build_ring, locate, locate_metrics, LocateOptions};
pub use source::{HttpRingSource, RingSource};
pub use topology::{fetch_ring_views, is_healthy, retrieved_views, views_agree};
