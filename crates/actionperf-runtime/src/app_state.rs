//! Shared application state for the actionperf HTTP app.

use std::sync::Arc;

use actionperf_core::backend::MetricBackend;
use actionperf_core::error::Result;

use crate::backend::{self, InMemoryBackend};
use crate::config::MonitorConfig;
use crate::monitor::PerfMonitor;
use crate::web::WebPerformanceTracker;

#[derive(Clone)]
pub struct AppState {
    monitor: PerfMonitor,
    store: Arc<InMemoryBackend>,
    web: Arc<WebPerformanceTracker>,
}

impl AppState {
    /// Build the in-memory counter store and the monitor on top of it.
    /// Returns Result so main can handle errors gracefully (no panic).
    pub fn new(cfg: MonitorConfig) -> Result<Self> {
        let store = backend::from_config(&cfg);
        let monitor = PerfMonitor::new(cfg, Arc::clone(&store) as Arc<dyn MetricBackend>)?;
        let web = Arc::new(WebPerformanceTracker::new(monitor.clone()));
        Ok(Self { monitor, store, web })
    }

    pub fn monitor(&self) -> &PerfMonitor {
        &self.monitor
    }

    pub fn store(&self) -> Arc<InMemoryBackend> {
        Arc::clone(&self.store)
    }

    pub fn web(&self) -> Arc<WebPerformanceTracker> {
        Arc::clone(&self.web)
    }
}
