//! Metric placement: ring construction and batch key resolution.

use std::collections::BTreeMap;

use tracing::info;
use wisp_ring::{EmptyRingError, HashRing};
use wisp_types::{Node, RingView};

use crate::error::ClusterError;
use crate::source::RingSource;
use crate::topology::{fetch_ring_views, is_healthy, views_agree};

/// Options controlling how [`locate_metrics`] verifies the topology.
#[derive(Debug, Clone, Default)]
pub struct LocateOptions {
    /// Hosts to query for ring views (the configured cluster).
    pub nodes: Vec<String>,
    /// When set, skip the cross-check and treat this host's reported view
    /// as the authoritative ring source.
    pub single_host: Option<String>,
    /// Treat any unreachable node as fatal (ignored in single-host mode).
    pub strict: bool,
}

/// Build a hash ring from one authoritative ring view.
///
/// The ring is constructed fresh per placement operation and never mutated
/// in place; a membership change means building a new one.
pub fn build_ring(view: &RingView) -> Result<HashRing, ClusterError> {
    if view.nodes.is_empty() {
        return Err(ClusterError::NoNodes);
    }

    let mut ring = HashRing::new();
    for node in view.parse_nodes()? {
        ring.add_node(node);
    }
    Ok(ring)
}

/// Resolve each key to its owning node.
///
/// Pure once the ring is built: no I/O, and duplicate keys collapse into a
/// single idempotent entry.
pub fn locate(
    ring: &HashRing,
    keys: &[String],
) -> Result<BTreeMap<String, Node>, EmptyRingError> {
    let mut placements = BTreeMap::new();
    for key in keys {
        let node = ring.get_node(key)?;
        placements.insert(key.clone(), node.clone());
    }
    Ok(placements)
}

/// Health-checked batch placement.
///
/// Without a single-host override this verifies the topology first and
/// fails with [`ClusterError::Inconsistent`] before resolving any key; a
/// placement computed from a disputed ring could route a write to a node
/// that disagrees it owns the key.
pub async fn locate_metrics(
    source: &dyn RingSource,
    opts: &LocateOptions,
    keys: &[String],
) -> Result<BTreeMap<String, Node>, ClusterError> {
    let view = authoritative_view(source, opts).await?;
    info!(
        reporting = %view.name,
        nodes = view.nodes.len(),
        keys = keys.len(),
        "resolving metric placement"
    );

    let ring = build_ring(&view)?;
    Ok(locate(&ring, keys)?)
}

/// Obtain the ring view placement will be computed from.
///
/// Single-host mode asks exactly one node and trusts its answer; otherwise
/// every configured node is queried and the views must agree.
async fn authoritative_view(
    source: &dyn RingSource,
    opts: &LocateOptions,
) -> Result<RingView, ClusterError> {
    if let Some(host) = &opts.single_host {
        info!(host = %host, "single-host override: skipping cluster health check");
        return source.fetch_ring(host).await;
    }

    if opts.nodes.is_empty() {
        return Err(ClusterError::NoNodes);
    }

    let views = fetch_ring_views(source, &opts.nodes).await;
    if !is_healthy(&views, opts.strict) {
        // Distinguish the cause for the caller: nothing retrieved, a node
        // missing under strict mode, or actual disagreement.
        if views.values().all(Option::is_none) {
            return Err(ClusterError::NoViews);
        }
        if !views_agree(&views) {
            return Err(ClusterError::Inconsistent);
        }
        let host = views
            .iter()
            .find(|(_, v)| v.is_none())
            .map(|(h, _)| h.clone())
            .unwrap_or_default();
        return Err(ClusterError::Unreachable { host });
    }

    // All retrieved views agree; take the first in host order.
    let view = views
        .into_values()
        .flatten()
        .next()
        .expect("healthy cluster has at least one view");
    Ok(view)
}
