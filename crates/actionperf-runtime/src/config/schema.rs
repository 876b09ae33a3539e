use serde::Deserialize;
use actionperf_core::error::{PerfError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    pub version: u32,

    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub dispatch: DispatchSection,

    #[serde(default)]
    pub backend: BackendSection,

    #[serde(default)]
    pub server: ServerSection,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            version: 1,
            monitor: MonitorSection::default(),
            dispatch: DispatchSection::default(),
            backend: BackendSection::default(),
            server: ServerSection::default(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PerfError::UnsupportedVersion);
        }
        self.monitor.validate()?;
        self.dispatch.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorSection {
    #[serde(default = "default_category")]
    pub category: String,

    #[serde(default = "default_action_kind")]
    pub action_kind: String,

    /// Defaults to the current process id.
    #[serde(default)]
    pub process_id: Option<u32>,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            category: default_category(),
            action_kind: default_action_kind(),
            process_id: None,
        }
    }
}

impl MonitorSection {
    pub fn validate(&self) -> Result<()> {
        if self.category.trim().is_empty() {
            return Err(PerfError::Config("monitor.category must not be empty".into()));
        }
        if self.action_kind.trim().is_empty() {
            return Err(PerfError::Config("monitor.action_kind must not be empty".into()));
        }
        Ok(())
    }

    pub fn effective_process_id(&self) -> u32 {
        self.process_id.unwrap_or_else(std::process::id)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchSection {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl DispatchSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=64).contains(&self.workers) {
            return Err(PerfError::Config(
                "dispatch.workers must be between 1 and 64".into(),
            ));
        }
        if !(16..=1_048_576).contains(&self.queue_capacity) {
            return Err(PerfError::Config(
                "dispatch.queue_capacity must be between 16 and 1048576".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendSection {
    #[serde(default = "default_true")]
    pub install_standard_category: bool,

    /// Counters left out of the installed category.
    #[serde(default)]
    pub unavailable_counters: Vec<String>,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            install_standard_category: true,
            unavailable_counters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { listen: default_listen() }
    }
}

fn default_category() -> String {
    "ActionPerf".into()
}
fn default_action_kind() -> String {
    "API".into()
}
fn default_workers() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_true() -> bool {
    true
}
fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
