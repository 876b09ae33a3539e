//! Top-level facade crate for actionperf.
//!
//! Re-exports core types and the runtime library so users can depend on a single crate.

pub mod core {
    pub use actionperf_core::*;
}

pub mod runtime {
    pub use actionperf_runtime::*;
}
