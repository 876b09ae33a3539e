//! Shared fixtures for runtime integration tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actionperf_core::backend::{standard_category, CounterHandle, MetricBackend};
use actionperf_core::{ActionIdentity, Result};
use actionperf_runtime::backend::InMemoryBackend;
use actionperf_runtime::config::{self, MonitorConfig};
use actionperf_runtime::PerfMonitor;

pub const CATEGORY: &str = "ActionPerf";

pub fn config(workers: usize, queue_capacity: usize) -> MonitorConfig {
    config::load_from_str(&format!(
        r#"
version: 1
monitor:
  category: "{CATEGORY}"
  process_id: 4242
dispatch:
  workers: {workers}
  queue_capacity: {queue_capacity}
"#
    ))
    .unwrap()
}

pub fn store(unavailable: &[&str]) -> Arc<InMemoryBackend> {
    let b = InMemoryBackend::new();
    let missing: Vec<String> = unavailable.iter().map(|s| s.to_string()).collect();
    b.install_category(standard_category(CATEGORY).without(&missing));
    Arc::new(b)
}

pub fn monitor() -> (PerfMonitor, Arc<InMemoryBackend>) {
    monitor_on(store(&[]), 4, 1024)
}

pub fn monitor_on(
    store: Arc<InMemoryBackend>,
    workers: usize,
    queue_capacity: usize,
) -> (PerfMonitor, Arc<InMemoryBackend>) {
    let m = PerfMonitor::new(
        config(workers, queue_capacity),
        Arc::clone(&store) as Arc<dyn MetricBackend>,
    )
    .unwrap();
    (m, store)
}

pub fn orders_get(m: &PerfMonitor) -> ActionIdentity {
    m.identity("Orders", "Get", "GET", "")
}

pub fn value(store: &InMemoryBackend, id: &ActionIdentity, counter: &str) -> i64 {
    store
        .raw_value(CATEGORY, counter, id.sanitized_name())
        .unwrap_or_else(|| panic!("counter {counter} not open"))
}

/// Backend wrapper counting how many counters were opened.
pub struct CountingBackend {
    pub inner: InMemoryBackend,
    pub opened: AtomicUsize,
}

impl CountingBackend {
    pub fn new() -> Self {
        let inner = InMemoryBackend::new();
        inner.install_category(standard_category(CATEGORY));
        Self { inner, opened: AtomicUsize::new(0) }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl MetricBackend for CountingBackend {
    fn open_counter(&self, category: &str, counter: &str, instance: &str) -> Result<CounterHandle> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        // widen the race window for concurrent first access
        std::thread::sleep(std::time::Duration::from_millis(1));
        self.inner.open_counter(category, counter, instance)
    }

    fn increment_by(&self, handle: &CounterHandle, n: i64) -> Result<()> {
        self.inner.increment_by(handle, n)
    }

    fn set_raw_value(&self, handle: &CounterHandle, n: i64) -> Result<()> {
        self.inner.set_raw_value(handle, n)
    }

    fn dispose(&self, handle: &CounterHandle) {
        self.inner.dispose(handle)
    }

    fn close_shared_resources(&self) {
        self.inner.close_shared_resources()
    }
}
