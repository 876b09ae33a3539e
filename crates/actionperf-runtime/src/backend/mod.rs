//! Counter backend adapters.

pub mod memory;

use std::sync::Arc;

use actionperf_core::backend::standard_category;

use crate::config::MonitorConfig;

pub use memory::{CounterRow, CounterSample, InMemoryBackend};

/// Build the in-memory backend described by `cfg`.
pub fn from_config(cfg: &MonitorConfig) -> Arc<InMemoryBackend> {
    let backend = InMemoryBackend::new();
    if cfg.backend.install_standard_category {
        let category = standard_category(cfg.monitor.category.clone())
            .without(&cfg.backend.unavailable_counters);
        backend.install_category(category);
    }
    for c in &cfg.backend.unavailable_counters {
        tracing::warn!(category = %cfg.monitor.category, counter = %c, "counter not installed");
    }
    Arc::new(backend)
}
