//! The monitor service object.
//!
//! Owns the metric registry and the notification dispatcher. Build one at
//! startup, share it (it is cheap to clone), and call `shutdown` at teardown.
//! Independent monitors do not share any state.

use std::sync::Arc;

use actionperf_core::backend::MetricBackend;
use actionperf_core::error::Result;
use actionperf_core::metrics::{MetricContext, PerformanceMetric};
use actionperf_core::ActionIdentity;

use crate::config::MonitorConfig;
use crate::dispatch::NotificationDispatcher;
use crate::registry::MetricRegistry;
use crate::tracker::PerformanceTracker;

#[derive(Clone)]
pub struct PerfMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    cfg: MonitorConfig,
    process_id: u32,
    registry: Arc<MetricRegistry>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl PerfMonitor {
    /// Build the monitor. Must be called from within a tokio runtime.
    pub fn new(cfg: MonitorConfig, backend: Arc<dyn MetricBackend>) -> Result<Self> {
        cfg.validate()?;

        let dispatcher =
            NotificationDispatcher::spawn(cfg.dispatch.workers, cfg.dispatch.queue_capacity)?;
        let registry = MetricRegistry::new(backend);
        let process_id = cfg.monitor.effective_process_id();

        tracing::info!(
            category = %cfg.monitor.category,
            process_id,
            workers = cfg.dispatch.workers,
            "performance monitor started"
        );

        Ok(Self {
            inner: Arc::new(MonitorInner {
                cfg,
                process_id,
                registry: Arc::new(registry),
                dispatcher: Arc::new(dispatcher),
            }),
        })
    }

    pub fn cfg(&self) -> &MonitorConfig {
        &self.inner.cfg
    }

    pub fn process_id(&self) -> u32 {
        self.inner.process_id
    }

    pub fn registry(&self) -> Arc<MetricRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub fn dispatcher(&self) -> Arc<NotificationDispatcher> {
        Arc::clone(&self.inner.dispatcher)
    }

    /// Identity in the configured category, with the configured kind and process id.
    pub fn identity(
        &self,
        resource: &str,
        operation: &str,
        http_method: &str,
        parameters: &str,
    ) -> ActionIdentity {
        let m = &self.inner.cfg.monitor;
        ActionIdentity::new(
            self.inner.process_id,
            m.category.as_str(),
            m.action_kind.as_str(),
            resource,
            operation,
            http_method,
            parameters,
        )
    }

    /// Fresh, idle tracker for one invocation.
    pub fn tracker(&self, identity: ActionIdentity) -> PerformanceTracker {
        PerformanceTracker::new(identity, self.registry(), self.dispatcher())
    }

    pub fn add_custom_metric_factory<F>(&self, factory: F)
    where
        F: Fn(&MetricContext) -> Result<Box<dyn PerformanceMetric>> + Send + Sync + 'static,
    {
        self.inner.registry.add_custom_metric_factory(factory);
    }

    /// Let queued notifications land, then dispose every metric set.
    pub async fn cleanup_all(&self) {
        self.inner.dispatcher.flush().await;
        self.inner.registry.cleanup_all();
    }

    /// Cleanup, then stop the dispatch workers.
    pub async fn shutdown(&self) {
        self.cleanup_all().await;
        self.inner.dispatcher.shutdown().await;
        tracing::info!("performance monitor stopped");
    }
}
