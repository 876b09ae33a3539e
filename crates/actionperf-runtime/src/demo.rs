//! Demo endpoints served by the binary.

use axum::{extract::Path, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn list_orders() -> impl IntoResponse {
    Json(json!({ "orders": [1, 2, 3] }))
}

pub async fn get_order(Path(id): Path<u64>) -> impl IntoResponse {
    Json(json!({ "id": id, "status": "shipped" }))
}

pub async fn create_order() -> impl IntoResponse {
    (StatusCode::CREATED, Json(json!({ "id": 4 })))
}

pub async fn fail() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "simulated failure")
}
