//! Minimal in-test counter backend.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use actionperf_core::backend::{CounterHandle, CounterKey, MetricBackend};
use actionperf_core::{PerfError, Result};

#[derive(Default)]
pub struct RecordingBackend {
    values: Mutex<HashMap<String, i64>>,
    open: Mutex<HashSet<u64>>,
    unavailable: HashSet<String>,
    denied: bool,
    next: AtomicU64,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without(counters: &[&str]) -> Self {
        Self {
            unavailable: counters.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn denying() -> Self {
        Self { denied: true, ..Self::default() }
    }

    pub fn value(&self, counter: &str) -> i64 {
        self.values.lock().unwrap().get(counter).copied().unwrap_or(0)
    }

    pub fn open_handles(&self) -> usize {
        self.open.lock().unwrap().len()
    }

    fn check(&self, handle: &CounterHandle) -> Result<()> {
        if self.denied {
            return Err(PerfError::AccessDenied(handle.key().to_string()));
        }
        if !self.open.lock().unwrap().contains(&handle.id()) {
            return Err(PerfError::CounterClosed(handle.id()));
        }
        Ok(())
    }
}

impl MetricBackend for RecordingBackend {
    fn open_counter(&self, category: &str, counter: &str, instance: &str) -> Result<CounterHandle> {
        if self.unavailable.contains(counter) {
            return Err(PerfError::BackendUnavailable {
                category: category.into(),
                counter: counter.into(),
            });
        }
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.open.lock().unwrap().insert(id);
        Ok(CounterHandle::new(id, CounterKey::new(category, counter, instance)))
    }

    fn increment_by(&self, handle: &CounterHandle, n: i64) -> Result<()> {
        self.check(handle)?;
        *self
            .values
            .lock()
            .unwrap()
            .entry(handle.key().counter.to_string())
            .or_insert(0) += n;
        Ok(())
    }

    fn set_raw_value(&self, handle: &CounterHandle, n: i64) -> Result<()> {
        self.check(handle)?;
        self.values
            .lock()
            .unwrap()
            .insert(handle.key().counter.to_string(), n);
        Ok(())
    }

    fn dispose(&self, handle: &CounterHandle) {
        self.open.lock().unwrap().remove(&handle.id());
    }

    fn close_shared_resources(&self) {}
}
