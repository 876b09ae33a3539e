//! actionperf core: runtime-free building blocks for per-action performance counters.
//!
//! This crate defines the action identity, the counter backend contract, the
//! metric capability with its built-in variants, and the metric set. It carries
//! no async runtime so metrics can be driven from any execution context.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Instrumentation must never take the instrumented process down, so all
//! fallible paths surface as `PerfError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod backend;
pub mod error;
pub mod identity;
pub mod metrics;

/// Elapsed ticks per second (ticks are nanoseconds).
pub const TICKS_PER_SECOND: u64 = 1_000_000_000;

/// Shared result type.
pub use error::{Result, PerfError};
pub use identity::ActionIdentity;
