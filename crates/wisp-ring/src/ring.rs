//! Hash ring implementation.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use wisp_types::Node;

/// Default number of ring positions per node.
pub const REPLICAS_PER_NODE: u16 = 100;

/// Error returned by [`HashRing::get_node`] when the ring has no members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("hash ring has no nodes")]
pub struct EmptyRingError;

/// Consistent hashing ring mapping metric keys to owning nodes.
///
/// Positions are `blake3(identity ++ replica_index)` truncated to `u64`,
/// where `identity` is `host` or `host:instance`. Lookup hashes the key the
/// same way and walks clockwise, wrapping past the largest position.
#[derive(Debug, Clone)]
pub struct HashRing {
    /// Ring position -> owning node.
    positions: BTreeMap<u64, Node>,
    /// Identities of nodes currently on the ring.
    members: BTreeSet<String>,
    /// Positions inserted per node.
    replicas: u16,
}

impl HashRing {
    /// Create an empty ring with [`REPLICAS_PER_NODE`] positions per node.
    pub fn new() -> Self {
        Self::with_replicas(REPLICAS_PER_NODE)
    }

    /// Create an empty ring with an explicit replica count.
    ///
    /// A count of 0 is bumped to 1 so that an added node always owns at
    /// least one position.
    pub fn with_replicas(replicas: u16) -> Self {
        Self {
            positions: BTreeMap::new(),
            members: BTreeSet::new(),
            replicas: replicas.max(1),
        }
    }

    /// Add a node's positions to the ring.
    ///
    /// Adding a node whose identity is already present is an idempotent
    /// no-op: the ring is unchanged and no positions are re-inserted.
    pub fn add_node(&mut self, node: Node) {
        let identity = node.identity();
        if !self.members.insert(identity.clone()) {
            debug!(node = %identity, "node already on ring, ignoring");
            return;
        }

        for replica in 0..self.replicas {
            let pos = replica_position(&identity, replica);
            self.positions.insert(pos, node.clone());
        }
        debug!(node = %identity, replicas = self.replicas, "added node to ring");
    }

    /// Remove a node's positions from the ring.
    ///
    /// Keys it owned resolve to the next node clockwise afterwards. Removing
    /// an absent node is a no-op.
    pub fn remove_node(&mut self, node: &Node) {
        let identity = node.identity();
        if !self.members.remove(&identity) {
            return;
        }

        for replica in 0..self.replicas {
            let pos = replica_position(&identity, replica);
            self.positions.remove(&pos);
        }
        debug!(node = %identity, "removed node from ring");
    }

    /// Resolve the owner of a metric key.
    ///
    /// Deterministic for a fixed node set: the same key always maps to the
    /// same node.
    pub fn get_node(&self, key: &str) -> Result<&Node, EmptyRingError> {
        if self.positions.is_empty() {
            return Err(EmptyRingError);
        }

        let pos = key_position(key);
        // Clockwise scan: everything at or after the key's position, then
        // wrap around to the smallest position.
        let after = self.positions.range(pos..);
        let before = self.positions.range(..pos);
        let (_, node) = after
            .chain(before)
            .next()
            .expect("non-empty ring has a next position");
        Ok(node)
    }

    /// Number of physical nodes on the ring.
    pub fn node_count(&self) -> usize {
        self.members.len()
    }

    /// Total number of ring positions.
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Whether the ring has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Identities of all member nodes, sorted.
    pub fn members(&self) -> Vec<String> {
        self.members.iter().cloned().collect()
    }
}

impl Default for HashRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Position of a node replica: `blake3(identity ++ replica_index)` as `u64`.
fn replica_position(identity: &str, replica: u16) -> u64 {
    let mut input = Vec::with_capacity(identity.len() + 2);
    input.extend_from_slice(identity.as_bytes());
    input.extend_from_slice(&replica.to_le_bytes());
    truncate_hash(&input)
}

/// Position of a metric key on the ring.
fn key_position(key: &str) -> u64 {
    truncate_hash(key.as_bytes())
}

fn truncate_hash(input: &[u8]) -> u64 {
    let hash = blake3::hash(input);
    let bytes: [u8; 8] = hash.as_bytes()[..8].try_into().expect("8 bytes");
    u64::from_le_bytes(bytes)
}
