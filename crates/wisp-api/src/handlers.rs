//! Node API request handlers.
//!
//! Metric files travel as opaque `application/octet-stream` bodies; stat
//! records ride alongside in the `x-wisp-stat` header so `HEAD` and `GET`
//! report the same shape. Timeseries endpoints speak JSON.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, Response, StatusCode};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use tracing::info;
use wisp_store::ListFilter;
use wisp_types::{MetricStat, RingView, SeriesSlice};

use crate::error::ApiError;
use crate::AppState;

/// Header carrying the JSON-encoded [`MetricStat`] of a metric response.
pub const STAT_HEADER: &str = "x-wisp-stat";

// -----------------------------------------------------------------------
// GET|POST /metrics — list local inventory
// -----------------------------------------------------------------------

#[derive(Deserialize, Default)]
pub(crate) struct ListParams {
    /// JSON array of metric keys to filter to.
    list: Option<String>,
    /// Discard the cached listing and rebuild.
    #[serde(default)]
    force: bool,
    /// Regular expression filter.
    regex: Option<String>,
}

pub(crate) async fn list_metrics(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<String>>, ApiError> {
    let exact = params
        .list
        .as_deref()
        .map(serde_json::from_str::<Vec<String>>)
        .transpose()
        .map_err(|e| {
            ApiError::Store(wisp_store::StoreError::Validation(format!(
                "list parameter is not a JSON string array: {e}"
            )))
        })?;

    let filter = ListFilter {
        exact,
        pattern: params.regex,
        force: params.force,
    };
    let keys = state.store.list_metrics(&filter)?;
    Ok(Json(keys))
}

// -----------------------------------------------------------------------
// /metrics/{key} — stat, fetch, replace, backfill, delete
// -----------------------------------------------------------------------

fn stat_header(stat: &MetricStat) -> Result<HeaderValue, ApiError> {
    let json = serde_json::to_string(stat)
        .map_err(|e| ApiError::Internal(format!("stat encode failed: {e}")))?;
    HeaderValue::from_str(&json)
        .map_err(|e| ApiError::Internal(format!("stat header invalid: {e}")))
}

pub(crate) async fn stat_metric(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response<Body>, ApiError> {
    let stat = state.store.stat_metric(&key).await?;
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(STAT_HEADER, stat_header(&stat)?)
        .body(Body::empty())
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(response)
}

pub(crate) async fn get_metric(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response<Body>, ApiError> {
    let (data, stat) = state.store.get_metric(&key).await?;
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(STAT_HEADER, stat_header(&stat)?)
        .body(Body::from(data))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(response)
}

pub(crate) async fn put_metric(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    state.store.put_metric(&key, body).await?;
    info!(metric = %key, "metric stored");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn backfill_metric(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    state.store.backfill_metric(&key, body).await?;
    info!(metric = %key, "metric backfilled");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn delete_metric(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_metric(&key).await?;
    info!(metric = %key, "metric deleted");
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------
// /timeseries/{key} — point-level read and write
// -----------------------------------------------------------------------

#[derive(Deserialize, Default)]
pub(crate) struct RangeParams {
    #[serde(default)]
    from: u64,
    until: Option<u64>,
}

pub(crate) async fn read_points(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Json<SeriesSlice>, ApiError> {
    let slice = state
        .store
        .read_points(&key, params.from, params.until)
        .await?;
    Ok(Json(slice))
}

pub(crate) async fn write_points(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(points): Json<SeriesSlice>,
) -> Result<StatusCode, ApiError> {
    state.store.write_points(&key, points).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------
// GET /hashring — this node's membership view
// -----------------------------------------------------------------------

pub(crate) async fn get_hashring(State(state): State<AppState>) -> Json<RingView> {
    Json(state.store.ring_view().clone())
}
