//! actionperf runtime library entry.
//!
//! This crate wires the counter backend, metric registry, notification
//! dispatcher and per-invocation trackers into a monitor service, and adds
//! the HTTP integration. It is consumed by the binary (`main.rs`) and by
//! integration tests.

pub mod app_state;
pub mod backend;
pub mod config;
pub mod demo;
pub mod dispatch;
pub mod monitor;
pub mod ops;
pub mod registry;
pub mod router;
pub mod tracker;
pub mod web;

pub use monitor::PerfMonitor;
pub use tracker::{PerformanceTracker, TrackerPhase};
