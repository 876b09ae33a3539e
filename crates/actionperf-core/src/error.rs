//! Shared error type across actionperf crates.

use thiserror::Error;

/// Coarse failure classes (stable API).
///
/// Every error maps to exactly one class. The class decides how a failure is
/// treated at the instrumentation boundary: construction failures drop a
/// single metric, dispatch and backend failures drop a single notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// A metric's backend counters could not be opened.
    Construction,
    /// A notification could not be queued or a callback failed.
    Dispatch,
    /// The counter backend rejected an operation.
    Backend,
    /// Invalid configuration.
    Config,
    /// Anything else.
    Internal,
}

impl FailureClass {
    /// String representation used in logs and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::Construction => "CONSTRUCTION",
            FailureClass::Dispatch => "DISPATCH",
            FailureClass::Backend => "BACKEND",
            FailureClass::Config => "CONFIG",
            FailureClass::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, PerfError>;

/// Unified error type used by core and runtime.
#[derive(Debug, Error)]
pub enum PerfError {
    #[error("counter backend unavailable: category={category} counter={counter}")]
    BackendUnavailable { category: String, counter: String },
    #[error("counter handle {0} is closed")]
    CounterClosed(u64),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("notification queue full")]
    QueueFull,
    #[error("dispatcher closed")]
    DispatcherClosed,
    #[error("no async runtime available")]
    NoRuntime,
    #[error("metric panicked: {0}")]
    MetricPanicked(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl PerfError {
    /// Map an error to its failure class.
    pub fn class(&self) -> FailureClass {
        match self {
            PerfError::BackendUnavailable { .. } => FailureClass::Construction,
            PerfError::CounterClosed(_) | PerfError::AccessDenied(_) => FailureClass::Backend,
            PerfError::QueueFull
            | PerfError::DispatcherClosed
            | PerfError::NoRuntime
            | PerfError::MetricPanicked(_) => FailureClass::Dispatch,
            PerfError::Config(_) | PerfError::UnsupportedVersion => FailureClass::Config,
            PerfError::Internal(_) => FailureClass::Internal,
        }
    }

    /// Build a `MetricPanicked` error from a caught panic payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        PerfError::MetricPanicked(msg)
    }
}
