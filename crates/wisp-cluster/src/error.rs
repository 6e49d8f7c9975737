//! Error types for topology and placement.

use wisp_types::NodeSpecError;

/// Errors that can occur while verifying topology or resolving placement.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// No nodes were configured to query.
    #[error("no cluster nodes configured")]
    NoNodes,

    /// A configured node identity string could not be parsed.
    #[error(transparent)]
    NodeSpec(#[from] NodeSpecError),

    /// No node returned a ring view at all.
    #[error("no ring view could be retrieved from any node")]
    NoViews,

    /// Retrieved ring views disagree about membership.
    ///
    /// Routing decisions built on a disputed ring are unsafe; the caller
    /// decides whether to escalate or retry with a single-host override.
    #[error("cluster is inconsistent: nodes disagree about ring membership")]
    Inconsistent,

    /// A node did not answer its ring-view query (strict mode only).
    #[error("node {host} did not return a ring view")]
    Unreachable {
        /// The node that failed to respond.
        host: String,
    },

    /// The ring built from the authoritative view has no members.
    #[error(transparent)]
    EmptyRing(#[from] wisp_ring::EmptyRingError),

    /// HTTP transport failure talking to a node.
    #[error("ring view request failed: {0}")]
    Http(#[from] reqwest::Error),
}
