//! actionperf demo server
//!
//! - Instrumented demo routes: /orders, /orders/:id, /fail
//! - Ops routes: /healthz, /metrics, /metrics.json
//! - Ctrl-C drains queued notifications and disposes every counter

use std::net::SocketAddr;

use tracing_subscriber::{fmt, EnvFilter};

use actionperf_core::error::{PerfError, Result};
use actionperf_runtime::{app_state, config, router};

const DEFAULT_CONFIG: &str = "actionperf.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let explicit = std::env::var("ACTIONPERF_CONFIG").ok();
    let cfg = config::load_or_default(explicit.as_deref(), DEFAULT_CONFIG)?;

    let listen: SocketAddr = cfg
        .server
        .listen
        .parse()
        .map_err(|e| PerfError::Config(format!("server.listen must be a valid SocketAddr: {e}")))?;

    let state = app_state::AppState::new(cfg)?;
    let monitor = state.monitor().clone();
    let app = router::build_router(state);

    tracing::info!(%listen, "actionperf starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| PerfError::Internal(format!("failed to bind: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| PerfError::Internal(format!("server failed: {e}")))?;

    monitor.shutdown().await;
    Ok(())
}
