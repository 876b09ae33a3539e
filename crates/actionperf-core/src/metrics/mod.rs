//! Metric capability and the standard metric variants.
//!
//! A metric observes start/complete events of one action and mutates one or
//! more backend counters. Metrics are shared by every concurrent invocation of
//! the same action, so callbacks take `&self` and rely on the backend's
//! per-operation atomicity.

pub mod set;
pub mod standard;

use std::sync::Arc;

use crate::backend::{CounterHandle, MetricBackend};
use crate::error::Result;
use crate::identity::ActionIdentity;

pub use set::MetricSet;
pub use standard::{MetricKind, StandardMetric};

/// Observer of start/complete events for one action.
pub trait PerformanceMetric: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Called when an invocation starts.
    fn on_start(&self) -> Result<()> {
        Ok(())
    }

    /// Called when an invocation completes.
    fn on_complete(&self, elapsed_ticks: u64, exception_occurred: bool) -> Result<()>;

    /// Release backend handles. Called once, when the owning set is disposed.
    fn dispose(&self);
}

/// What a metric constructor gets to work with.
#[derive(Clone)]
pub struct MetricContext {
    pub identity: ActionIdentity,
    pub backend: Arc<dyn MetricBackend>,
}

impl MetricContext {
    pub fn new(identity: ActionIdentity, backend: Arc<dyn MetricBackend>) -> Self {
        Self { identity, backend }
    }

    /// Open a counter in the identity's category for the identity's instance.
    pub fn open(&self, counter: &str) -> Result<BoundCounter> {
        let handle = self.backend.open_counter(
            self.identity.category(),
            counter,
            self.identity.sanitized_name(),
        )?;
        Ok(BoundCounter { backend: Arc::clone(&self.backend), handle })
    }
}

/// Constructor for a user-defined metric, invoked once per new identity.
pub type MetricFactory =
    Arc<dyn Fn(&MetricContext) -> Result<Box<dyn PerformanceMetric>> + Send + Sync>;

/// A counter handle together with the backend that issued it.
pub struct BoundCounter {
    backend: Arc<dyn MetricBackend>,
    handle: CounterHandle,
}

impl BoundCounter {
    pub fn handle(&self) -> &CounterHandle { &self.handle }

    pub fn increment(&self) -> Result<()> {
        self.backend.increment(&self.handle)
    }

    pub fn increment_by(&self, n: u64) -> Result<()> {
        self.backend.increment_by(&self.handle, clamp(n))
    }

    pub fn decrement(&self) -> Result<()> {
        self.backend.decrement(&self.handle)
    }

    pub fn set_raw_value(&self, n: u64) -> Result<()> {
        self.backend.set_raw_value(&self.handle, clamp(n))
    }

    pub fn dispose(&self) {
        self.backend.dispose(&self.handle);
    }
}

fn clamp(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
