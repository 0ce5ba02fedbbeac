//! HTTP front end.

use axum::extract::{Path, State};
use axum::http::header::{ACCEPT_ENCODING, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tower_http::compression::CompressionLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, instrument};
use vigil_core::observability::metrics::record_request;
use vigil_core::{Metric, MetricKind, MetricUpdate, VigilError};

use super::extract::{JsonBody, SealedJson};
use super::middleware::{check_origin, verify_integrity};
use super::{apply_update, read_metric, ApiError, AppState};

/// Response signature header, `HashSHA256` on the wire.
const SIGNATURE_HEADER: HeaderName = HeaderName::from_static(vigil_core::HASH_METADATA);

/// Build the HTTP router.
///
/// Layers run outermost first: trace, compression, origin check, integrity
/// check, then the handler.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/update/", post(update_json))
        .route("/update/:mtype/:name/:value", post(update_path))
        .route("/updates/", post(update_batch))
        .route("/value/", post(value_json))
        .route("/value/:mtype/:name", get(value_path))
        .route("/ping", get(ping))
        .layer(from_fn_with_state(state.clone(), verify_integrity))
        .layer(from_fn_with_state(state.clone(), check_origin))
        .layer(SetResponseHeaderLayer::overriding(ACCEPT_ENCODING, HeaderValue::from_static("gzip")))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// JSON response carrying the signature header when signing is enabled.
fn signed_json<T: serde::Serialize>(state: &AppState, value: &T) -> Result<Response, ApiError> {
    let body = serde_json::to_vec(value).map_err(VigilError::from)?;
    let signature = state.envelope.signer().sign(&body);

    let mut response = (StatusCode::OK, [(CONTENT_TYPE, "application/json")], body).into_response();
    if let Some(signature) = signature {
        let value = HeaderValue::from_str(&signature).map_err(VigilError::internal)?;
        response.headers_mut().insert(SIGNATURE_HEADER, value);
    }
    Ok(response)
}

#[instrument(skip(state, metric), fields(metric_id = %metric.id, kind = %metric.mtype))]
async fn update_json(
    State(state): State<AppState>,
    SealedJson(metric): SealedJson<Metric>,
) -> Result<Response, ApiError> {
    record_request("http", "update");
    let update = MetricUpdate::try_from(&metric)?;
    let stored = apply_update(state.store.as_ref(), update).await?;
    debug!("Metric updated");
    signed_json(&state, &stored)
}

#[instrument(skip(state))]
async fn update_path(
    State(state): State<AppState>,
    Path((mtype, name, value)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    record_request("http", "update_path");
    let metric = Metric::from_parts(&mtype, &name, &value)?;
    let update = MetricUpdate::try_from(&metric)?;
    apply_update(state.store.as_ref(), update).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip(state, metrics), fields(batch_size = metrics.len()))]
async fn update_batch(
    State(state): State<AppState>,
    SealedJson(metrics): SealedJson<Vec<Metric>>,
) -> Result<StatusCode, ApiError> {
    record_request("http", "updates");
    state.store.update_batch(&metrics).await?;
    metrics::counter!("vigil_metrics_applied_total").increment(metrics.len() as u64);
    debug!("Batch applied");
    Ok(StatusCode::OK)
}

/// Body of `POST /value/`; only `id` and `type` are read.
#[derive(Debug, Deserialize)]
struct ValueQuery {
    id: String,
    #[serde(rename = "type")]
    mtype: String,
}

#[instrument(skip(state, query), fields(metric_id = %query.id, kind = %query.mtype))]
async fn value_json(
    State(state): State<AppState>,
    JsonBody(query): JsonBody<ValueQuery>,
) -> Result<Response, ApiError> {
    record_request("http", "value");
    let kind: MetricKind = query.mtype.parse()?;
    let metric = read_metric(state.store.as_ref(), kind, &query.id).await?;
    signed_json(&state, &metric)
}

#[instrument(skip(state))]
async fn value_path(
    State(state): State<AppState>,
    Path((mtype, name)): Path<(String, String)>,
) -> Result<String, ApiError> {
    record_request("http", "value_path");
    let kind: MetricKind = mtype.parse()?;
    let metric = read_metric(state.store.as_ref(), kind, &name).await?;
    Ok(match kind {
        MetricKind::Gauge => metric.value.unwrap_or_default().to_string(),
        MetricKind::Counter => metric.delta.unwrap_or_default().to_string(),
    })
}

async fn ping(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.store.ping().await?;
    Ok(StatusCode::OK)
}

/// Status page listing every stored metric.
async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let gauges = state.store.list_gauges().await?;
    let counters = state.store.list_counters().await?;

    let mut page = String::from("<html><body><h1>Metrics</h1><table>");
    page.push_str("<tr><th>Name</th><th>Type</th><th>Value</th></tr>");
    for (id, value) in &gauges {
        page.push_str(&format!("<tr><td>{}</td><td>gauge</td><td>{}</td></tr>", escape(id), value));
    }
    for (id, total) in &counters {
        page.push_str(&format!("<tr><td>{}</td><td>counter</td><td>{}</td></tr>", escape(id), total));
    }
    page.push_str("</table></body></html>");
    Ok(Html(page))
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
