// SPDX-License-Identifier: EUPL-1.2

//! Axum route handlers for CSP Reports.
//!
//! ## Endpoints
//!
//! - `GET  /health` - Health check
//! - `POST /report/` - Receive a browser CSP violation report
//!
//! Point the `report-uri` directive of your `Content-Security-Policy` header
//! at `/report/`.

use crate::{db::AppState, models::IncomingReport};
use axum::{
    body::Bytes,
    extract::State,
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// All routes, with request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/report/", post(report_csp))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Health ────────────────────────────────────────────────────────────────────

/// `GET /health` - Health check
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "csp-reports",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Report ────────────────────────────────────────────────────────────────────

/// `POST /report/` - Accept a violation report.
///
/// Always answers `200` with an empty body: the reporting browser cannot act
/// on errors, so failures only reach the log.
pub async fn report_csp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let user_agent = headers
        .get(USER_AGENT)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
    let report = IncomingReport::new(body.to_vec(), user_agent);

    if let Err(e) = state.pipeline.process(&report).await {
        tracing::error!("Failed to process CSP report: {e}");
    }

    StatusCode::OK
}

// ── Tests ─────────────────────────────────────────────────────────────────────
