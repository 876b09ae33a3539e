//! The ten built-in metrics.
//!
//! All variants share one implementation: `MetricKind` says which counters to
//! open and how events map onto them.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::backend::{
    AVERAGE_TIME_PER_CALL, AVERAGE_TIME_PER_CALL_BASE, CALLS_IN_PROGRESS, CALLS_PER_SECOND,
    DELTA_CALLS, DELTA_ELAPSED_TIME, DELTA_EXCEPTIONS_THROWN, LAST_CALL_ELAPSED_TIME, TOTAL_CALLS,
    TOTAL_ELAPSED_TIME, TOTAL_EXCEPTIONS_THROWN,
};
use crate::error::{PerfError, Result};

use super::{BoundCounter, MetricContext, PerformanceMetric};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    TotalCalls,
    TotalElapsedTime,
    DeltaCalls,
    DeltaElapsedTime,
    AverageCallTime,
    CallsPerSecond,
    CallsInProgress,
    LastCallElapsedTime,
    TotalExceptionsThrown,
    DeltaExceptionsThrown,
}

impl MetricKind {
    /// Construction order of the standard set.
    pub const ALL: [MetricKind; 10] = [
        MetricKind::TotalCalls,
        MetricKind::TotalElapsedTime,
        MetricKind::DeltaCalls,
        MetricKind::DeltaElapsedTime,
        MetricKind::AverageCallTime,
        MetricKind::CallsPerSecond,
        MetricKind::CallsInProgress,
        MetricKind::LastCallElapsedTime,
        MetricKind::TotalExceptionsThrown,
        MetricKind::DeltaExceptionsThrown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::TotalCalls => "total_calls",
            MetricKind::TotalElapsedTime => "total_elapsed_time",
            MetricKind::DeltaCalls => "delta_calls",
            MetricKind::DeltaElapsedTime => "delta_elapsed_time",
            MetricKind::AverageCallTime => "average_call_time",
            MetricKind::CallsPerSecond => "calls_per_second",
            MetricKind::CallsInProgress => "calls_in_progress",
            MetricKind::LastCallElapsedTime => "last_call_elapsed_time",
            MetricKind::TotalExceptionsThrown => "total_exceptions_thrown",
            MetricKind::DeltaExceptionsThrown => "delta_exceptions_thrown",
        }
    }

    /// Primary counter name.
    pub fn counter_name(self) -> &'static str {
        match self {
            MetricKind::TotalCalls => TOTAL_CALLS,
            MetricKind::TotalElapsedTime => TOTAL_ELAPSED_TIME,
            MetricKind::DeltaCalls => DELTA_CALLS,
            MetricKind::DeltaElapsedTime => DELTA_ELAPSED_TIME,
            MetricKind::AverageCallTime => AVERAGE_TIME_PER_CALL,
            MetricKind::CallsPerSecond => CALLS_PER_SECOND,
            MetricKind::CallsInProgress => CALLS_IN_PROGRESS,
            MetricKind::LastCallElapsedTime => LAST_CALL_ELAPSED_TIME,
            MetricKind::TotalExceptionsThrown => TOTAL_EXCEPTIONS_THROWN,
            MetricKind::DeltaExceptionsThrown => DELTA_EXCEPTIONS_THROWN,
        }
    }

    /// Second counter, for metrics reported as a ratio.
    pub fn base_counter_name(self) -> Option<&'static str> {
        match self {
            MetricKind::AverageCallTime => Some(AVERAGE_TIME_PER_CALL_BASE),
            _ => None,
        }
    }
}

/// A built-in metric bound to its counters.
pub struct StandardMetric {
    kind: MetricKind,
    primary: BoundCounter,
    base: Option<BoundCounter>,
}

impl StandardMetric {
    /// Open the counters for `kind`. If the second counter cannot be opened
    /// (including a backend panic), the first is released again before the
    /// error is returned.
    pub fn open(kind: MetricKind, ctx: &MetricContext) -> Result<Self> {
        let primary = ctx.open(kind.counter_name())?;
        let base = match kind.base_counter_name() {
            Some(name) => match catch_unwind(AssertUnwindSafe(|| ctx.open(name)))
                .unwrap_or_else(|payload| Err(PerfError::from_panic(payload)))
            {
                Ok(c) => Some(c),
                Err(e) => {
                    primary.dispose();
                    return Err(e);
                }
            },
            None => None,
        };
        Ok(Self { kind, primary, base })
    }

    pub fn kind(&self) -> MetricKind { self.kind }
}

impl PerformanceMetric for StandardMetric {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn on_start(&self) -> Result<()> {
        match self.kind {
            MetricKind::CallsInProgress => self.primary.increment(),
            _ => Ok(()),
        }
    }

    fn on_complete(&self, elapsed_ticks: u64, exception_occurred: bool) -> Result<()> {
        match self.kind {
            MetricKind::TotalCalls | MetricKind::DeltaCalls | MetricKind::CallsPerSecond => {
                self.primary.increment()
            }
            MetricKind::TotalElapsedTime | MetricKind::DeltaElapsedTime => {
                self.primary.increment_by(elapsed_ticks)
            }
            // sum and base are two separate backend operations; a reader can
            // see the sum updated before the base.
            MetricKind::AverageCallTime => {
                self.primary.increment_by(elapsed_ticks)?;
                match &self.base {
                    Some(base) => base.increment(),
                    None => Ok(()),
                }
            }
            MetricKind::CallsInProgress => self.primary.decrement(),
            MetricKind::LastCallElapsedTime => self.primary.set_raw_value(elapsed_ticks),
            MetricKind::TotalExceptionsThrown | MetricKind::DeltaExceptionsThrown => {
                if exception_occurred {
                    self.primary.increment()
                } else {
                    Ok(())
                }
            }
        }
    }

    fn dispose(&self) {
        self.primary.dispose();
        if let Some(base) = &self.base {
            base.dispose();
        }
    }
}
