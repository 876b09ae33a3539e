//! Operational HTTP endpoints.
//!
//! - `/healthz`      : liveness
//! - `/metrics`      : Prometheus text format
//! - `/metrics.json` : counter snapshot as JSON

use std::fmt::Write;

use axum::{extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

use crate::app_state::AppState;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let mut body = String::new();
    state.store().render("actionperf_counter", &mut body);
    state.monitor().dispatcher().render(&mut body);
    let _ = writeln!(
        body,
        "# TYPE actionperf_metric_sets gauge\nactionperf_metric_sets {}",
        state.monitor().registry().len()
    );
    let _ = writeln!(
        body,
        "# TYPE actionperf_requests_in_flight gauge\nactionperf_requests_in_flight {}",
        state.web().in_flight()
    );

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

pub async fn metrics_json(State(state): State<AppState>) -> Response {
    let body = json!({
        "category": state.monitor().cfg().monitor.category,
        "metric_sets": state.monitor().registry().len(),
        "dispatch": state.monitor().dispatcher().stats(),
        "counters": state.store().snapshot(),
    });
    (StatusCode::OK, Json(body)).into_response()
}
