//! Tests for topology verification and placement.

use std::collections::BTreeMap;

use wisp_types::RingView;

use crate::source::RingSource;
use crate::topology::{fetch_ring_views, is_healthy, retrieved_views, views_agree};
use crate::{build_ring, locate, locate_metrics, ClusterError, LocateOptions};

/// In-memory ring source: hosts map to canned views; absent hosts are
/// treated as unreachable.
struct MockSource {
    views: BTreeMap<String, RingView>,
}

impl MockSource {
    fn new(entries: &[(&str, &[&str])]) -> Self {
        let views = entries
            .iter()
            .map(|(host, nodes)| {
                (
                    host.to_string(),
                    RingView {
                        name: host.to_string(),
                        nodes: nodes.iter().map(|n| n.to_string()).collect(),
                    },
                )
            })
            .collect();
        Self { views }
    }
}

#[async_trait::async_trait]
impl RingSource for MockSource {
    async fn fetch_ring(&self, host: &str) -> Result<RingView, ClusterError> {
        self.views
            .get(host)
            .cloned()
            .ok_or(ClusterError::Unreachable {
                host: host.to_string(),
            })
    }
}

fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

// -----------------------------------------------------------------------
// Topology
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_fetch_marks_unreachable_instead_of_aborting() {
    let source = MockSource::new(&[("a", &["a", "b"])]);
    let views = fetch_ring_views(&source, &hosts(&["a", "dead"])).await;

    assert_eq!(views.len(), 2);
    assert!(views["a"].is_some());
    assert!(views["dead"].is_none());
    assert_eq!(retrieved_views(&views).len(), 1);
}

#[tokio::test]
async fn test_views_agree_is_order_independent() {
    let source = MockSource::new(&[("a", &["a", "b", "c"]), ("b", &["c", "a", "b"])]);
    let views = fetch_ring_views(&source, &hosts(&["a", "b"])).await;
    assert!(views_agree(&views));
    assert!(is_healthy(&views, true));
}

#[tokio::test]
async fn test_any_disagreement_is_unhealthy_even_if_all_reachable() {
    // Node b's view omits c.
    let source = MockSource::new(&[
        ("a", &["a", "b", "c"]),
        ("b", &["a", "b"]),
        ("c", &["a", "b", "c"]),
    ]);
    let views = fetch_ring_views(&source, &hosts(&["a", "b", "c"])).await;

    assert_eq!(retrieved_views(&views).len(), 3, "all nodes reachable");
    assert!(!views_agree(&views));
    assert!(!is_healthy(&views, false));
}

#[tokio::test]
async fn test_unreachable_node_tolerated_unless_strict() {
    let source = MockSource::new(&[("a", &["a", "b"]), ("b", &["a", "b"])]);
    let views = fetch_ring_views(&source, &hosts(&["a", "b", "dead"])).await;

    assert!(views_agree(&views), "surviving views still agree");
    assert!(is_healthy(&views, false));
    assert!(!is_healthy(&views, true), "strict mode requires all nodes");
}

#[tokio::test]
async fn test_no_views_is_unhealthy() {
    let source = MockSource::new(&[]);
    let views = fetch_ring_views(&source, &hosts(&["x", "y"])).await;
    assert!(!is_healthy(&views, false));
}

// -----------------------------------------------------------------------
// Ring construction and pure placement
// -----------------------------------------------------------------------

#[test]
fn test_build_ring_rejects_empty_view() {
    let view = RingView {
        name: "a".to_string(),
        nodes: vec![],
    };
    assert!(matches!(build_ring(&view), Err(ClusterError::NoNodes)));
}

#[test]
fn test_build_ring_rejects_bad_node_spec() {
    let view = RingView {
        name: "a".to_string(),
        nodes: vec!["ok".to_string(), ":broken".to_string()],
    };
    assert!(matches!(build_ring(&view), Err(ClusterError::NodeSpec(_))));
}

#[test]
fn test_build_ring_parses_instances() {
    let view = RingView {
        name: "a".to_string(),
        nodes: vec!["a:0".to_string(), "a:1".to_string(), "b".to_string()],
    };
    let ring = build_ring(&view).unwrap();
    assert_eq!(ring.node_count(), 3);
}

#[test]
fn test_locate_collapses_duplicates() {
    let view = RingView {
        name: "a".to_string(),
        nodes: vec!["a".to_string(), "b".to_string()],
    };
    let ring = build_ring(&view).unwrap();

    let keys = vec![
        "x.y.z".to_string(),
        "x.y.z".to_string(),
        "other.metric".to_string(),
    ];
    let placements = locate(&ring, &keys).unwrap();
    assert_eq!(placements.len(), 2);
    assert!(placements.contains_key("x.y.z"));
}

#[test]
fn test_locate_on_empty_ring_fails() {
    let ring = wisp_ring::HashRing::new();
    assert!(locate(&ring, &["a.b".to_string()]).is_err());
}

// -----------------------------------------------------------------------
// End-to-end placement scenarios
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_healthy_cluster_resolves_and_is_stable() {
    let members: &[&str] = &["a", "b", "c"];
    let source = MockSource::new(&[("a", members), ("b", members), ("c", members)]);
    let opts = LocateOptions {
        nodes: hosts(&["a", "b", "c"]),
        ..Default::default()
    };
    let keys = vec!["x.y.z".to_string()];

    let first = locate_metrics(&source, &opts, &keys).await.unwrap();
    let owner = first["x.y.z"].clone();
    assert!(members.contains(&owner.host.as_str()));

    // Same membership -> same answer, every time.
    for _ in 0..5 {
        let again = locate_metrics(&source, &opts, &keys).await.unwrap();
        assert_eq!(again["x.y.z"], owner);
    }
}

#[tokio::test]
async fn test_inconsistent_cluster_fails_before_resolving() {
    // b's reported view omits c.
    let source = MockSource::new(&[
        ("a", &["a", "b", "c"]),
        ("b", &["a", "b"]),
        ("c", &["a", "b", "c"]),
    ]);
    let opts = LocateOptions {
        nodes: hosts(&["a", "b", "c"]),
        ..Default::default()
    };

    let result = locate_metrics(&source, &opts, &["x.y.z".to_string()]).await;
    assert!(matches!(result, Err(ClusterError::Inconsistent)));
}

#[tokio::test]
async fn test_single_host_override_bypasses_health_check() {
    // Same inconsistent cluster as above; the override trusts node a.
    let source = MockSource::new(&[
        ("a", &["a", "b", "c"]),
        ("b", &["a", "b"]),
    ]);
    let opts = LocateOptions {
        nodes: hosts(&["a", "b"]),
        single_host: Some("a".to_string()),
        strict: false,
    };

    let placements = locate_metrics(&source, &opts, &["x.y.z".to_string()])
        .await
        .unwrap();
    assert_eq!(placements.len(), 1);
}

#[tokio::test]
async fn test_no_nodes_configured_is_config_error() {
    let source = MockSource::new(&[]);
    let opts = LocateOptions::default();
    let result = locate_metrics(&source, &opts, &["k".to_string()]).await;
    assert!(matches!(result, Err(ClusterError::NoNodes)));
}

#[tokio::test]
async fn test_all_unreachable_reports_no_views() {
    let source = MockSource::new(&[]);
    let opts = LocateOptions {
        nodes: hosts(&["x", "y"]),
        ..Default::default()
    };
    let result = locate_metrics(&source, &opts, &["k".to_string()]).await;
    assert!(matches!(result, Err(ClusterError::NoViews)));
}

#[tokio::test]
async fn test_strict_mode_names_the_unreachable_host() {
    let source = MockSource::new(&[("a", &["a", "b"]), ("b", &["a", "b"])]);
    let opts = LocateOptions {
        nodes: hosts(&["a", "b", "dead"]),
        single_host: None,
        strict: true,
    };
    let result = locate_metrics(&source, &opts, &["k".to_string()]).await;
    match result {
        Err(ClusterError::Unreachable { host }) => assert_eq!(host, "dead"),
        other => panic!("expected Unreachable, got {other:?}"),
    }
}
