//! Ring-view query abstraction.

use std::time::Duration;

use wisp_types::RingView;

use crate::error::ClusterError;

/// Capability to ask a node for its self-reported ring view.
///
/// Production uses [`HttpRingSource`]; tests substitute an in-memory map.
#[async_trait::async_trait]
pub trait RingSource: Send + Sync {
    /// Fetch the ring view the given host reports for itself.
    async fn fetch_ring(&self, host: &str) -> Result<RingView, ClusterError>;
}

/// [`RingSource`] that queries `GET http://{host}:{port}/hashring`.
///
/// Every request is bounded by the configured timeout; a slow or dead node
/// produces an error for that host only and never stalls the whole fetch.
pub struct HttpRingSource {
    client: reqwest::Client,
    port: u16,
}

impl HttpRingSource {
    /// Create a source querying the given node protocol port.
    pub fn new(port: u16, timeout: Duration) -> Result<Self, ClusterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client, port })
    }
}

#[async_trait::async_trait]
impl RingSource for HttpRingSource {
    async fn fetch_ring(&self, host: &str) -> Result<RingView, ClusterError> {
        let url = format!("http://{}:{}/hashring", host, self.port);
        let view = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<RingView>()
            .await?;
        Ok(view)
    }
}
