//! Counter backend contract.
//!
//! The backend is the external counter store. Counters are addressed by
//! (category, counter name, instance name) and accessed through opaque
//! handles. Individual operations are expected to be atomic; nothing here
//! makes a group of operations atomic.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;

pub const TOTAL_CALLS: &str = "Total Calls";
pub const TOTAL_ELAPSED_TIME: &str = "Total Elapsed Time";
pub const DELTA_CALLS: &str = "Delta Calls";
pub const DELTA_ELAPSED_TIME: &str = "Delta Elapsed Time";
pub const AVERAGE_TIME_PER_CALL: &str = "Average Time per Call";
pub const AVERAGE_TIME_PER_CALL_BASE: &str = "Average Time per Call Base";
pub const CALLS_PER_SECOND: &str = "Calls per Second";
pub const CALLS_IN_PROGRESS: &str = "Calls in Progress";
pub const LAST_CALL_ELAPSED_TIME: &str = "Last Call Elapsed Time";
pub const TOTAL_EXCEPTIONS_THROWN: &str = "Total Exceptions Thrown";
pub const DELTA_EXCEPTIONS_THROWN: &str = "Delta Exceptions Thrown";

/// How a backend should interpret a counter's stored value when sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    /// Cumulative value.
    NumberOfItems,
    /// Change since the previous sample.
    Delta,
    /// Change since the previous sample per elapsed second.
    RateOfCountsPerSecond,
    /// Numerator of an average; paired with an `AverageBase` counter.
    AverageTimer,
    /// Denominator of an average.
    AverageBase,
    /// Last value set.
    RawValue,
}

/// Address of one counter instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub category: Arc<str>,
    pub counter: Arc<str>,
    pub instance: Arc<str>,
}

impl CounterKey {
    pub fn new(category: &str, counter: &str, instance: &str) -> Self {
        Self {
            category: Arc::from(category),
            counter: Arc::from(counter),
            instance: Arc::from(instance),
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.category, self.counter, self.instance)
    }
}

/// Opaque handle to an opened counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterHandle {
    id: u64,
    key: CounterKey,
}

impl CounterHandle {
    pub fn new(id: u64, key: CounterKey) -> Self {
        Self { id, key }
    }

    pub fn id(&self) -> u64 { self.id }
    pub fn key(&self) -> &CounterKey { &self.key }
}

/// One counter of a category definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterDefinition {
    pub name: String,
    pub kind: CounterKind,
}

/// A category and the counters registered under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDefinition {
    pub name: String,
    pub counters: Vec<CounterDefinition>,
}

impl CategoryDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), counters: Vec::new() }
    }

    pub fn with_counter(mut self, name: impl Into<String>, kind: CounterKind) -> Self {
        self.counters.push(CounterDefinition { name: name.into(), kind });
        self
    }

    /// Drop the named counters (hosts where some counters are not installed).
    pub fn without(mut self, names: &[String]) -> Self {
        self.counters.retain(|c| !names.iter().any(|n| n == &c.name));
        self
    }

    pub fn kind_of(&self, counter: &str) -> Option<CounterKind> {
        self.counters.iter().find(|c| c.name == counter).map(|c| c.kind)
    }
}

/// Category with every counter the standard metrics need.
pub fn standard_category(name: impl Into<String>) -> CategoryDefinition {
    CategoryDefinition::new(name)
        .with_counter(TOTAL_CALLS, CounterKind::NumberOfItems)
        .with_counter(TOTAL_ELAPSED_TIME, CounterKind::NumberOfItems)
        .with_counter(DELTA_CALLS, CounterKind::Delta)
        .with_counter(DELTA_ELAPSED_TIME, CounterKind::Delta)
        .with_counter(AVERAGE_TIME_PER_CALL, CounterKind::AverageTimer)
        .with_counter(AVERAGE_TIME_PER_CALL_BASE, CounterKind::AverageBase)
        .with_counter(CALLS_PER_SECOND, CounterKind::RateOfCountsPerSecond)
        .with_counter(CALLS_IN_PROGRESS, CounterKind::NumberOfItems)
        .with_counter(LAST_CALL_ELAPSED_TIME, CounterKind::RawValue)
        .with_counter(TOTAL_EXCEPTIONS_THROWN, CounterKind::NumberOfItems)
        .with_counter(DELTA_EXCEPTIONS_THROWN, CounterKind::Delta)
}

/// External counter store.
pub trait MetricBackend: Send + Sync {
    /// Open a counter instance. Fails with `BackendUnavailable` when the
    /// category or counter is not registered with the host.
    fn open_counter(&self, category: &str, counter: &str, instance: &str) -> Result<CounterHandle>;

    fn increment(&self, handle: &CounterHandle) -> Result<()> {
        self.increment_by(handle, 1)
    }

    fn increment_by(&self, handle: &CounterHandle, n: i64) -> Result<()>;

    fn decrement(&self, handle: &CounterHandle) -> Result<()> {
        self.increment_by(handle, -1)
    }

    fn set_raw_value(&self, handle: &CounterHandle, n: i64) -> Result<()>;

    /// Release a handle. Disposing twice is harmless.
    fn dispose(&self, handle: &CounterHandle);

    /// Release process-wide backend resources. Called once at shutdown.
    fn close_shared_resources(&self);
}
