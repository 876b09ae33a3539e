//! Axum router wiring.
//!
//! Ops routes are served untracked; the demo routes go through the tracking
//! middleware.

use axum::{routing::get, Router};

use crate::{app_state::AppState, demo, ops, web};

pub fn build_router(state: AppState) -> Router {
    let tracked = Router::new()
        .route("/orders", get(demo::list_orders).post(demo::create_order))
        .route("/orders/:id", get(demo::get_order))
        .route("/fail", get(demo::fail));

    Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/metrics", get(ops::metrics))
        .route("/metrics.json", get(ops::metrics_json))
        .merge(web::instrument(tracked, state.web()))
        .with_state(state)
}
