//! Per-invocation performance tracker.
//!
//! Idle -> Running -> Completed, each step at most once. Nothing in here
//! returns an error or lets a panic escape: whatever goes wrong, the
//! instrumented operation carries on and the invocation is simply not
//! recorded.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use actionperf_core::error::PerfError;
use actionperf_core::ActionIdentity;

use crate::dispatch::{CompletionTicket, NotificationDispatcher};
use crate::registry::MetricRegistry;

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    Idle,
    Running,
    Completed,
}

enum State {
    Idle,
    Running {
        started: Instant,
        /// `None` when the start notification could not be queued.
        ticket: Option<CompletionTicket>,
    },
    Completed,
}

pub struct PerformanceTracker {
    identity: ActionIdentity,
    registry: Arc<MetricRegistry>,
    dispatcher: Arc<NotificationDispatcher>,
    state: State,
}

impl PerformanceTracker {
    pub fn new(
        identity: ActionIdentity,
        registry: Arc<MetricRegistry>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self { identity, registry, dispatcher, state: State::Idle }
    }

    pub fn identity(&self) -> &ActionIdentity {
        &self.identity
    }

    pub fn phase(&self) -> TrackerPhase {
        match self.state {
            State::Idle => TrackerPhase::Idle,
            State::Running { .. } => TrackerPhase::Running,
            State::Completed => TrackerPhase::Completed,
        }
    }

    /// Whether the start notification was queued, i.e. whether this
    /// invocation will show up in the counters.
    pub fn is_recorded(&self) -> bool {
        matches!(self.state, State::Running { ticket: Some(_), .. })
    }

    /// Start timing, resolve the metric set and queue the start notification.
    pub fn start(&mut self) {
        if !matches!(self.state, State::Idle) {
            tracing::debug!(identity = %self.identity, "tracker already started; ignoring start");
            return;
        }
        let started = Instant::now();

        let ticket = catch_unwind(AssertUnwindSafe(|| {
            let set = self.registry.get_or_create(&self.identity);
            self.dispatcher.dispatch_start(set)
        }))
        .unwrap_or_else(|payload| Err(PerfError::from_panic(payload)));

        let ticket = match ticket {
            Ok(t) => Some(t),
            Err(e) => {
                report(&self.identity, "start", &e);
                None
            }
        };

        self.state = State::Running { started, ticket };
    }

    /// Stop timing and queue the complete notification.
    pub fn complete(&mut self, unhandled_exception: bool) {
        let elapsed_ticks = match &self.state {
            State::Running { started, .. } => {
                u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX)
            }
            _ => 0,
        };
        self.complete_with_elapsed(elapsed_ticks, unhandled_exception);
    }

    /// Like [`PerformanceTracker::complete`], with the elapsed time measured by the caller.
    pub fn complete_with_elapsed(&mut self, elapsed_ticks: u64, unhandled_exception: bool) {
        match std::mem::replace(&mut self.state, State::Completed) {
            State::Running { ticket: Some(ticket), .. } => {
                ticket.complete(elapsed_ticks, unhandled_exception);
            }
            State::Running { ticket: None, .. } => {
                tracing::debug!(
                    identity = %self.identity,
                    "start was not recorded; skipping complete"
                );
            }
            State::Idle => {
                tracing::debug!(identity = %self.identity, "complete without start ignored");
                self.state = State::Idle;
            }
            State::Completed => {
                tracing::debug!(
                    identity = %self.identity,
                    "tracker already completed; ignoring complete"
                );
            }
        }
    }
}

impl Drop for PerformanceTracker {
    /// An invocation abandoned while running (e.g. its future was dropped by
    /// a panic) is completed as failed so in-progress counts stay balanced.
    fn drop(&mut self) {
        if matches!(self.state, State::Running { .. }) {
            tracing::debug!(identity = %self.identity, "tracker dropped while running");
            self.complete(true);
        }
    }
}

fn report(identity: &ActionIdentity, event: &'static str, e: &PerfError) {
    match e {
        PerfError::QueueFull => tracing::warn!(
            identity = %identity,
            event,
            "invocation not recorded: dispatch queue full"
        ),
        _ => tracing::debug!(
            identity = %identity,
            event,
            class = e.class().as_str(),
            error = %e,
            "instrumentation failure ignored"
        ),
    }
}
