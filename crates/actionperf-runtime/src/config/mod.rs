//! Monitor config loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use actionperf_core::error::{PerfError, Result};

pub use schema::{BackendSection, DispatchSection, MonitorConfig, MonitorSection, ServerSection};

pub fn load_from_file(path: &str) -> Result<MonitorConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| PerfError::Config(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<MonitorConfig> {
    let cfg: MonitorConfig = serde_yaml::from_str(s)
        .map_err(|e| PerfError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Config for the binary.
///
/// An `explicit` path (from the environment) must exist. Without one,
/// `fallback` is loaded when present and defaults are used otherwise.
pub fn load_or_default(explicit: Option<&str>, fallback: &str) -> Result<MonitorConfig> {
    match explicit {
        Some(path) => {
            if !Path::new(path).exists() {
                return Err(PerfError::Config(format!("config file not found: {path}")));
            }
            load_from_file(path)
        }
        None if Path::new(fallback).exists() => load_from_file(fallback),
        None => {
            tracing::warn!(path = fallback, "config file not found; using defaults");
            Ok(MonitorConfig::default())
        }
    }
}
