//! In-process counter store.
//!
//! Counter values live in atomics indexed by `DashMap`s. Categories must be
//! installed before counters in them can be opened, the same way a host
//! registers counter categories ahead of time. Instances are reference
//! counted by open handles and disappear with their last handle.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use actionperf_core::backend::{
    CategoryDefinition, CounterHandle, CounterKey, CounterKind, MetricBackend,
};
use actionperf_core::error::{PerfError, Result};

/// Suffix linking an average counter to its base counter.
const BASE_SUFFIX: &str = " Base";

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

struct Cell {
    kind: CounterKind,
    value: AtomicI64,
    refs: AtomicUsize,
    created: Instant,
}

/// Last sampled value of a `Delta`/`RateOfCountsPerSecond` counter.
#[derive(Clone, Copy)]
struct SampleMark {
    value: i64,
    at: Instant,
}

/// One computed counter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterSample {
    pub counter: String,
    pub kind: CounterKind,
    pub value: f64,
}

/// One stored counter value, for snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterRow {
    pub category: String,
    pub counter: String,
    pub instance: String,
    pub kind: CounterKind,
    pub raw: i64,
}

#[derive(Default)]
pub struct InMemoryBackend {
    categories: DashMap<String, CategoryDefinition>,
    cells: DashMap<CounterKey, Arc<Cell>>,
    handles: DashMap<u64, Arc<Cell>>,
    marks: DashMap<CounterKey, SampleMark>,
    next_handle: AtomicU64,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a category definition.
    pub fn install_category(&self, def: CategoryDefinition) {
        tracing::debug!(category = %def.name, counters = def.counters.len(), "category installed");
        self.categories.insert(def.name.clone(), def);
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Number of live counter instances.
    pub fn instance_count(&self) -> usize {
        self.cells.len()
    }

    /// Stored value of a counter instance, if it is open.
    pub fn raw_value(&self, category: &str, counter: &str, instance: &str) -> Option<i64> {
        self.cells
            .get(&CounterKey::new(category, counter, instance))
            .map(|c| c.value.load(Ordering::Relaxed))
    }

    /// Compute the reported value of every open counter of one instance, in
    /// category definition order.
    ///
    /// Sampling advances the reference point of `Delta` and
    /// `RateOfCountsPerSecond` counters.
    pub fn sample(&self, category: &str, instance: &str) -> Vec<CounterSample> {
        let Some(def) = self.categories.get(category).map(|d| d.value().clone()) else {
            return vec![];
        };
        let now = Instant::now();

        let mut out = Vec::with_capacity(def.counters.len());
        for c in &def.counters {
            let key = CounterKey::new(category, &c.name, instance);
            let Some(cell) = self.cells.get(&key).map(|r| Arc::clone(r.value())) else {
                continue;
            };
            let current = cell.value.load(Ordering::Relaxed);

            let value = match cell.kind {
                CounterKind::NumberOfItems | CounterKind::RawValue | CounterKind::AverageBase => {
                    current as f64
                }
                CounterKind::Delta => {
                    let prev = self.advance_mark(&key, current, now, cell.created);
                    (current - prev.value) as f64
                }
                CounterKind::RateOfCountsPerSecond => {
                    let prev = self.advance_mark(&key, current, now, cell.created);
                    let secs = now.duration_since(prev.at).as_secs_f64();
                    if secs > 0.0 {
                        (current - prev.value) as f64 / secs
                    } else {
                        0.0
                    }
                }
                // sum and base are read one after the other; a concurrent
                // completion can land between the two loads.
                CounterKind::AverageTimer => {
                    let base_key =
                        CounterKey::new(category, &format!("{}{BASE_SUFFIX}", c.name), instance);
                    let base = self
                        .cells
                        .get(&base_key)
                        .map(|b| b.value.load(Ordering::Relaxed))
                        .unwrap_or(0);
                    if base > 0 {
                        current as f64 / base as f64
                    } else {
                        0.0
                    }
                }
            };

            out.push(CounterSample { counter: c.name.clone(), kind: cell.kind, value });
        }
        out
    }

    fn advance_mark(
        &self,
        key: &CounterKey,
        current: i64,
        now: Instant,
        created: Instant,
    ) -> SampleMark {
        let mut mark = self
            .marks
            .entry(key.clone())
            .or_insert(SampleMark { value: 0, at: created });
        let prev = *mark;
        *mark = SampleMark { value: current, at: now };
        prev
    }

    /// Stored values of every open counter, sorted by address.
    pub fn snapshot(&self) -> Vec<CounterRow> {
        let mut rows: Vec<CounterRow> = self
            .cells
            .iter()
            .map(|r| {
                let k = r.key();
                CounterRow {
                    category: k.category.to_string(),
                    counter: k.counter.to_string(),
                    instance: k.instance.to_string(),
                    kind: r.value().kind,
                    raw: r.value().value.load(Ordering::Relaxed),
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            (&a.category, &a.instance, &a.counter).cmp(&(&b.category, &b.instance, &b.counter))
        });
        rows
    }

    /// Render stored values in Prometheus text exposition format.
    pub fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} gauge", name);
        let mut lines = BTreeMap::new();
        for row in self.snapshot() {
            let labels = format!(
                "category=\"{}\",counter=\"{}\",instance=\"{}\"",
                escape_label(&row.category),
                escape_label(&row.counter),
                escape_label(&row.instance)
            );
            lines.insert(labels, row.raw);
        }
        for (labels, v) in lines {
            let _ = writeln!(out, "{}{{{}}} {}", name, labels, v);
        }
    }

    fn cell(&self, handle: &CounterHandle) -> Result<Arc<Cell>> {
        self.handles
            .get(&handle.id())
            .map(|r| Arc::clone(r.value()))
            .ok_or(PerfError::CounterClosed(handle.id()))
    }
}

impl MetricBackend for InMemoryBackend {
    fn open_counter(&self, category: &str, counter: &str, instance: &str) -> Result<CounterHandle> {
        let kind = self
            .categories
            .get(category)
            .and_then(|def| def.kind_of(counter))
            .ok_or_else(|| PerfError::BackendUnavailable {
                category: category.to_string(),
                counter: counter.to_string(),
            })?;

        let key = CounterKey::new(category, counter, instance);
        let cell = {
            let entry = self.cells.entry(key.clone()).or_insert_with(|| {
                Arc::new(Cell {
                    kind,
                    value: AtomicI64::new(0),
                    refs: AtomicUsize::new(0),
                    created: Instant::now(),
                })
            });
            entry.refs.fetch_add(1, Ordering::AcqRel);
            Arc::clone(entry.value())
        };

        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(id, cell);
        Ok(CounterHandle::new(id, key))
    }

    fn increment_by(&self, handle: &CounterHandle, n: i64) -> Result<()> {
        self.cell(handle)?.value.fetch_add(n, Ordering::Relaxed);
        Ok(())
    }

    fn set_raw_value(&self, handle: &CounterHandle, n: i64) -> Result<()> {
        self.cell(handle)?.value.store(n, Ordering::Relaxed);
        Ok(())
    }

    fn dispose(&self, handle: &CounterHandle) {
        let Some((_, cell)) = self.handles.remove(&handle.id()) else {
            return;
        };
        if cell.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            let key = handle.key();
            if self
                .cells
                .remove_if(key, |_, c| c.refs.load(Ordering::Acquire) == 0)
                .is_some()
            {
                self.marks.remove(key);
            }
        }
    }

    fn close_shared_resources(&self) {
        self.marks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actionperf_core::backend::{self, standard_category};

    const CAT: &str = "ActionPerf";
    const INST: &str = "API [GET] Orders Get";

    fn backend() -> InMemoryBackend {
        let b = InMemoryBackend::new();
        b.install_category(standard_category(CAT));
        b
    }

    #[test]
    fn unknown_category_or_counter_is_unavailable() {
        let b = backend();
        let err = b.open_counter("Nope", backend::TOTAL_CALLS, INST).unwrap_err();
        assert!(matches!(err, PerfError::BackendUnavailable { .. }));
        let err = b.open_counter(CAT, "Not A Counter", INST).unwrap_err();
        assert!(matches!(err, PerfError::BackendUnavailable { .. }));
    }

    #[test]
    fn instances_are_shared_and_refcounted() {
        let b = backend();
        let h1 = b.open_counter(CAT, backend::TOTAL_CALLS, INST).unwrap();
        let h2 = b.open_counter(CAT, backend::TOTAL_CALLS, INST).unwrap();
        b.increment(&h1).unwrap();
        b.increment_by(&h2, 4).unwrap();
        assert_eq!(b.raw_value(CAT, backend::TOTAL_CALLS, INST), Some(5));

        b.dispose(&h1);
        assert_eq!(b.raw_value(CAT, backend::TOTAL_CALLS, INST), Some(5));
        assert!(matches!(b.increment(&h1), Err(PerfError::CounterClosed(_))));

        b.dispose(&h2);
        b.dispose(&h2);
        assert_eq!(b.raw_value(CAT, backend::TOTAL_CALLS, INST), None);
        assert_eq!(b.open_handles(), 0);
        assert_eq!(b.instance_count(), 0);
    }

    #[test]
    fn sampling_interprets_kinds() {
        let b = backend();
        let total = b.open_counter(CAT, backend::TOTAL_CALLS, INST).unwrap();
        let delta = b.open_counter(CAT, backend::DELTA_CALLS, INST).unwrap();
        let avg = b.open_counter(CAT, backend::AVERAGE_TIME_PER_CALL, INST).unwrap();
        let base = b.open_counter(CAT, backend::AVERAGE_TIME_PER_CALL_BASE, INST).unwrap();
        let last = b.open_counter(CAT, backend::LAST_CALL_ELAPSED_TIME, INST).unwrap();

        for t in [1500, 500] {
            b.increment(&total).unwrap();
            b.increment(&delta).unwrap();
            b.increment_by(&avg, t).unwrap();
            b.increment(&base).unwrap();
            b.set_raw_value(&last, t).unwrap();
        }

        let get = |samples: &[CounterSample], name: &str| {
            samples.iter().find(|s| s.counter == name).map(|s| s.value)
        };

        let s = b.sample(CAT, INST);
        assert_eq!(get(&s, backend::TOTAL_CALLS), Some(2.0));
        assert_eq!(get(&s, backend::DELTA_CALLS), Some(2.0));
        assert_eq!(get(&s, backend::AVERAGE_TIME_PER_CALL), Some(1000.0));
        assert_eq!(get(&s, backend::AVERAGE_TIME_PER_CALL_BASE), Some(2.0));
        assert_eq!(get(&s, backend::LAST_CALL_ELAPSED_TIME), Some(500.0));
        // not opened
        assert_eq!(get(&s, backend::CALLS_PER_SECOND), None);

        b.increment(&delta).unwrap();
        let s = b.sample(CAT, INST);
        assert_eq!(get(&s, backend::DELTA_CALLS), Some(1.0));
        assert_eq!(get(&s, backend::TOTAL_CALLS), Some(2.0));
    }

    #[test]
    fn average_without_calls_is_zero() {
        let b = backend();
        let _avg = b.open_counter(CAT, backend::AVERAGE_TIME_PER_CALL, INST).unwrap();
        let s = b.sample(CAT, INST);
        assert_eq!(s[0].value, 0.0);
    }

    #[test]
    fn render_escapes_labels() {
        let b = backend();
        let h = b.open_counter(CAT, backend::TOTAL_CALLS, "say \"hi\"").unwrap();
        b.increment(&h).unwrap();
        let mut out = String::new();
        b.render("actionperf_counter", &mut out);
        assert!(out.starts_with("# TYPE actionperf_counter gauge\n"));
        assert!(out.contains(
            "actionperf_counter{category=\"ActionPerf\",counter=\"Total Calls\",\
             instance=\"say \\\"hi\\\"\"} 1"
        ));
    }
}
