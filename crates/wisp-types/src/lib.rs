//! Shared types for the Wisp metric cluster.
//!
//! This crate defines the data model used across the Wisp workspace:
//! cluster nodes ([`Node`]), self-reported membership views ([`RingView`]),
//! per-metric stat records ([`MetricStat`]), and fixed-stride timeseries
//! slices ([`SeriesSlice`]).
//!
//! Wire field names (`Name`, `Nodes`, `Size`, ...) match the node HTTP
//! protocol and are fixed by serde attributes, so changing a Rust field
//! name never silently changes the protocol.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Error produced when parsing a node identity string fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid node spec {spec:?}: {reason}")]
pub struct NodeSpecError {
    /// The offending input string.
    pub spec: String,
    /// Why it was rejected.
    pub reason: String,
}

/// A storage node in the cluster.
///
/// `instance` distinguishes multiple metric stores on one host; when absent
/// the default store is assumed. The hashing identity is `host` or
/// `host:instance`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Node {
    /// Hostname of the node.
    pub host: String,
    /// Optional instance name for multi-store hosts.
    pub instance: Option<String>,
}

impl Node {
    /// Create a node from a host and optional instance.
    pub fn new(host: impl Into<String>, instance: Option<String>) -> Self {
        Self {
            host: host.into(),
            instance,
        }
    }

    /// The string identity used for ring hashing: `host` or `host:instance`.
    pub fn identity(&self) -> String {
        match &self.instance {
            Some(instance) => format!("{}:{}", self.host, instance),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{}:{}", self.host, instance),
            None => write!(f, "{}", self.host),
        }
    }
}

impl FromStr for Node {
    type Err = NodeSpecError;

    /// Parse `host` or `host:instance`.
    ///
    /// An empty host, an empty instance after the colon, or more than one
    /// colon is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason: &str| NodeSpecError {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        let mut fields = s.split(':');
        let host = fields.next().unwrap_or_default();
        if host.is_empty() {
            return Err(err("empty host"));
        }

        let instance = fields.next();
        if fields.next().is_some() {
            return Err(err("expected host or host:instance"));
        }
        if let Some(instance) = instance {
            if instance.is_empty() {
                return Err(err("empty instance"));
            }
        }

        Ok(Node {
            host: host.to_string(),
            instance: instance.map(str::to_string),
        })
    }
}

// ---------------------------------------------------------------------------
// Ring view
// ---------------------------------------------------------------------------

/// A node's self-reported belief about cluster membership.
///
/// Produced on demand by `GET /hashring`; never persisted. `nodes` entries
/// are `host` or `host:instance` identity strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingView {
    /// Name of the node reporting this view.
    #[serde(rename = "Name")]
    pub name: String,
    /// Identity strings of every node this node believes is in the ring.
    #[serde(rename = "Nodes")]
    pub nodes: Vec<String>,
}

impl RingView {
    /// The membership as an order-independent set.
    ///
    /// Two views agree iff their node sets are equal; the order nodes are
    /// listed in is irrelevant because ring construction is deterministic
    /// for a given set.
    pub fn node_set(&self) -> BTreeSet<&str> {
        self.nodes.iter().map(String::as_str).collect()
    }

    /// Parse every entry into a [`Node`], failing on the first bad spec.
    pub fn parse_nodes(&self) -> Result<Vec<Node>, NodeSpecError> {
        self.nodes.iter().map(|s| s.parse()).collect()
    }
}

// ---------------------------------------------------------------------------
// Metric stat
// ---------------------------------------------------------------------------

/// Stat record for a metric's backing file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricStat {
    /// Metric key.
    #[serde(rename = "Name")]
    pub name: String,
    /// File size in bytes.
    #[serde(rename = "Size")]
    pub size: u64,
    /// Unix mode bits.
    #[serde(rename = "Mode")]
    pub mode: u32,
    /// Modification time as Unix seconds.
    #[serde(rename = "ModTime")]
    pub mod_time: i64,
}

// ---------------------------------------------------------------------------
// Timeseries
// ---------------------------------------------------------------------------

/// A fixed-stride slice of timeseries data.
///
/// Slot `i` covers the timestamp `epoch + i * interval`. A `None` value is
/// a gap marker ("no data"), which is distinct from a stored `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSlice {
    /// Unix timestamp of the first slot.
    #[serde(rename = "epoch")]
    pub epoch: u64,
    /// Seconds between consecutive slots.
    #[serde(rename = "interval")]
    pub interval: u64,
    /// Slot values; `None` marks a gap.
    #[serde(rename = "values")]
    pub values: Vec<Option<f64>>,
}

impl SeriesSlice {
    /// Create a slice starting at `epoch` with the given stride and values.
    pub fn new(epoch: u64, interval: u64, values: Vec<Option<f64>>) -> Self {
        Self {
            epoch,
            interval,
            values,
        }
    }

    /// An empty slice with the given stride.
    pub fn empty(epoch: u64, interval: u64) -> Self {
        Self::new(epoch, interval, Vec::new())
    }

    /// Timestamp of slot `i`.
    pub fn slot_time(&self, i: usize) -> u64 {
        self.epoch + self.interval * i as u64
    }

    /// One past the timestamp of the last slot.
    pub fn end(&self) -> u64 {
        self.epoch + self.interval * self.values.len() as u64
    }

    /// Like [`SeriesSlice::end`], but `None` when the range does not fit
    /// in the epoch domain.
    pub fn checked_end(&self) -> Option<u64> {
        self.interval
            .checked_mul(self.values.len() as u64)
            .and_then(|span| self.epoch.checked_add(span))
    }

    /// Whether the slice holds no slots at all.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_parse_host_only() {
        let node: Node = "graphite010".parse().unwrap();
        assert_eq!(node.host, "graphite010");
        assert_eq!(node.instance, None);
        assert_eq!(node.identity(), "graphite010");
    }

    #[test]
    fn test_node_parse_host_and_instance() {
        let node: Node = "graphite010:a".parse().unwrap();
        assert_eq!(node.host, "graphite010");
        assert_eq!(node.instance.as_deref(), Some("a"));
        assert_eq!(node.identity(), "graphite010:a");
    }

    #[test]
    fn test_node_parse_rejects_bad_specs() {
        assert!("".parse::<Node>().is_err());
        assert!(":a".parse::<Node>().is_err());
        assert!("host:".parse::<Node>().is_err());
        assert!("host:a:b".parse::<Node>().is_err());
    }

    #[test]
    fn test_node_display_matches_identity() {
        let with = Node::new("h", Some("i".to_string()));
        let without = Node::new("h", None);
        assert_eq!(with.to_string(), with.identity());
        assert_eq!(without.to_string(), without.identity());
    }

    #[test]
    fn test_ring_view_node_set_ignores_order() {
        let a = RingView {
            name: "a".to_string(),
            nodes: vec!["x".to_string(), "y".to_string()],
        };
        let b = RingView {
            name: "b".to_string(),
            nodes: vec!["y".to_string(), "x".to_string()],
        };
        assert_eq!(a.node_set(), b.node_set());
    }

    #[test]
    fn test_ring_view_wire_field_names() {
        let view = RingView {
            name: "graphite010".to_string(),
            nodes: vec!["graphite010:a".to_string()],
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["Name"], "graphite010");
        assert_eq!(json["Nodes"][0], "graphite010:a");
    }

    #[test]
    fn test_ring_view_parse_nodes() {
        let view = RingView {
            name: "n".to_string(),
            nodes: vec!["a".to_string(), "b:1".to_string()],
        };
        let nodes = view.parse_nodes().unwrap();
        assert_eq!(nodes[0], Node::new("a", None));
        assert_eq!(nodes[1], Node::new("b", Some("1".to_string())));

        let bad = RingView {
            name: "n".to_string(),
            nodes: vec!["a".to_string(), ":".to_string()],
        };
        assert!(bad.parse_nodes().is_err());
    }

    #[test]
    fn test_metric_stat_wire_field_names() {
        let stat = MetricStat {
            name: "app.host.cpu".to_string(),
            size: 1024,
            mode: 0o644,
            mod_time: 1_700_000_000,
        };
        let json = serde_json::to_value(&stat).unwrap();
        assert_eq!(json["Name"], "app.host.cpu");
        assert_eq!(json["Size"], 1024);
        assert_eq!(json["Mode"], 0o644);
        assert_eq!(json["ModTime"], 1_700_000_000);
    }

    #[test]
    fn test_series_slice_slot_math() {
        let slice = SeriesSlice::new(100, 10, vec![Some(1.0), None, Some(3.0)]);
        assert_eq!(slice.slot_time(0), 100);
        assert_eq!(slice.slot_time(2), 120);
        assert_eq!(slice.end(), 130);
        assert!(!slice.is_empty());
        assert!(SeriesSlice::empty(0, 10).is_empty());
    }

    #[test]
    fn test_series_slice_checked_end() {
        let slice = SeriesSlice::new(100, 10, vec![Some(1.0), None]);
        assert_eq!(slice.checked_end(), Some(120));

        let near_max = SeriesSlice::new(u64::MAX - 10, 1, vec![None; 20]);
        assert_eq!(near_max.checked_end(), None);

        let wide_stride = SeriesSlice::new(0, u64::MAX, vec![None, None]);
        assert_eq!(wide_stride.checked_end(), None);
    }

    #[test]
    fn test_series_slice_gap_serializes_as_null() {
        let slice = SeriesSlice::new(100, 10, vec![Some(1.5), None]);
        let json = serde_json::to_string(&slice).unwrap();
        assert!(json.contains("null"), "gap must serialize as null: {json}");

        let back: SeriesSlice = serde_json::from_str(&json).unwrap();
        assert_eq!(back, slice);
    }
}
