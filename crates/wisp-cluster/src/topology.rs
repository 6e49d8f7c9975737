//! Parallel ring-view fetch and cluster health verdict.
//!
//! Reachability (did every node answer?) and agreement (do the answers
//! match?) are deliberately separate checks. The outward verdict is one
//! boolean, but tests and the `servers` diagnostic need to tell the two
//! failure causes apart.

use std::collections::BTreeMap;

use tracing::{debug, warn};
use wisp_types::RingView;

use crate::source::RingSource;

/// Query every host for its ring view, in parallel.
///
/// A host that fails to answer within the source's timeout is recorded as
/// `None` rather than aborting the whole fetch. The result preserves every
/// queried host so callers can distinguish "unreachable" from "not asked".
pub async fn fetch_ring_views(
    source: &dyn RingSource,
    hosts: &[String],
) -> BTreeMap<String, Option<RingView>> {
    let fetches = hosts.iter().map(|host| async move {
        match source.fetch_ring(host).await {
            Ok(view) => {
                debug!(host = %host, nodes = view.nodes.len(), "retrieved ring view");
                (host.clone(), Some(view))
            }
            Err(e) => {
                warn!(host = %host, error = %e, "failed to retrieve ring view");
                (host.clone(), None)
            }
        }
    });

    futures::future::join_all(fetches).await.into_iter().collect()
}

/// The views that were actually retrieved, in host order.
pub fn retrieved_views(views: &BTreeMap<String, Option<RingView>>) -> Vec<&RingView> {
    views.values().flatten().collect()
}

/// Whether every retrieved view reports the same node set.
///
/// Order-independent: two views listing the same members in a different
/// order agree. Vacuously true when fewer than two views were retrieved.
pub fn views_agree(views: &BTreeMap<String, Option<RingView>>) -> bool {
    let mut retrieved = retrieved_views(views).into_iter();
    let Some(first) = retrieved.next() else {
        return true;
    };
    let reference = first.node_set();
    retrieved.all(|view| view.node_set() == reference)
}

/// Overall health verdict.
///
/// Healthy iff at least one view was retrieved and all retrieved views
/// agree. With `strict`, any unreachable node also makes the cluster
/// unhealthy, even when every answer that did arrive agrees.
pub fn is_healthy(views: &BTreeMap<String, Option<RingView>>, strict: bool) -> bool {
    if retrieved_views(views).is_empty() {
        return false;
    }
    if strict && views.values().any(Option::is_none) {
        return false;
    }
    views_agree(views)
}
