//! The metrics bound to one identity.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PerfError, Result};

use super::PerformanceMetric;

/// Ordered, immutable-after-creation collection of metrics for one identity.
pub struct MetricSet {
    identity: Arc<str>,
    metrics: Vec<Box<dyn PerformanceMetric>>,
    disposed: AtomicBool,
}

impl MetricSet {
    pub fn new(identity: Arc<str>, metrics: Vec<Box<dyn PerformanceMetric>>) -> Self {
        Self { identity, metrics, disposed: AtomicBool::new(false) }
    }

    /// Raw name of the owning identity.
    pub fn identity(&self) -> &str { &self.identity }

    pub fn len(&self) -> usize { self.metrics.len() }

    pub fn is_empty(&self) -> bool { self.metrics.is_empty() }

    pub fn metric_names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name()).collect()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Deliver a start event to every metric. Returns the number of metrics
    /// that failed; a failing metric never stops delivery to the rest.
    pub fn notify_start(&self) -> usize {
        self.notify_each("start", |m| m.on_start())
    }

    /// Deliver a complete event to every metric. Same failure rules as
    /// [`MetricSet::notify_start`].
    pub fn notify_complete(&self, elapsed_ticks: u64, exception_occurred: bool) -> usize {
        self.notify_each("complete", |m| m.on_complete(elapsed_ticks, exception_occurred))
    }

    fn notify_each<F>(&self, event: &'static str, f: F) -> usize
    where
        F: Fn(&dyn PerformanceMetric) -> Result<()>,
    {
        let mut failed = 0;
        for m in &self.metrics {
            let res = catch_unwind(AssertUnwindSafe(|| f(m.as_ref())))
                .unwrap_or_else(|payload| Err(PerfError::from_panic(payload)));
            if let Err(e) = res {
                failed += 1;
                tracing::debug!(
                    identity = %self.identity,
                    metric = m.name(),
                    event,
                    class = e.class().as_str(),
                    error = %e,
                    "metric notification failed"
                );
            }
        }
        failed
    }

    /// Dispose every metric. Only the first call has an effect.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for m in &self.metrics {
            if catch_unwind(AssertUnwindSafe(|| m.dispose())).is_err() {
                tracing::warn!(
                    identity = %self.identity,
                    metric = m.name(),
                    "metric dispose panicked"
                );
            }
        }
    }
}

impl std::fmt::Debug for MetricSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricSet")
            .field("identity", &self.identity)
            .field("metrics", &self.metric_names())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
