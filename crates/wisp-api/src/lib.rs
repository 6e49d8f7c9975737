//! Node HTTP API for Wisp.
//!
//! Provides an [`ApiServer`] exposing an axum-based HTTP API over a
//! [`MetricStore`]:
//!
//! - `GET|POST /metrics` — list local inventory; `list` (JSON array),
//!   `regex` (pattern), `force` (rebuild) query parameters. Answers
//!   202 while the inventory cache is building.
//! - `HEAD /metrics/{key}` — stat, in the `x-wisp-stat` header.
//! - `GET /metrics/{key}` — raw series file plus stat header.
//! - `PUT /metrics/{key}` — full replace.
//! - `POST /metrics/{key}` — backfill merge (fills gaps only).
//! - `DELETE /metrics/{key}` — remove.
//! - `GET /timeseries/{key}?from=&until=` — range read (JSON).
//! - `POST /timeseries/{key}` — commit points (JSON body).
//! - `GET /hashring` — this node's membership view, `{Name, Nodes}`.

mod error;
mod handlers;


use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use wisp_store::MetricStore;

pub use error::ApiError;
pub use handlers::STAT_HEADER;

/// Shared state for all node API handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    /// The node's metric store.
    pub store: Arc<MetricStore>,
}

/// HTTP server over a node's [`MetricStore`].
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Create a server over the given store.
    pub fn new(store: Arc<MetricStore>) -> Self {
        let state = AppState { store };
        let router = Router::new()
            .route(
                "/metrics",
                get(handlers::list_metrics).post(handlers::list_metrics),
            )
            .route(
                "/metrics/{key}",
                get(handlers::get_metric)
                    .head(handlers::stat_metric)
                    .put(handlers::put_metric)
                    .post(handlers::backfill_metric)
                    .delete(handlers::delete_metric),
            )
            .route(
                "/timeseries/{key}",
                get(handlers::read_points).post(handlers::write_points),
            )
            .route("/hashring", get(handlers::get_hashring))
            .with_state(state);
        Self { router }
    }

    /// Return the inner [`Router`] (useful for testing with `tower::ServiceExt`).
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve the node API on the given TCP address.
    pub async fn serve(self, addr: &str) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "node API listening");
        axum::serve(listener, self.router).await
    }

    /// Serve with graceful shutdown triggered by the given future.
    pub async fn serve_with_shutdown(
        self,
        addr: &str,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "node API listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
