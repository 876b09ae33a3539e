//! Metric set cache behavior.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::{Arc, Barrier, Mutex};

use actionperf_core::backend::{self, CounterHandle, MetricBackend};
use actionperf_core::metrics::{MetricKind, PerformanceMetric};
use actionperf_core::{ActionIdentity, PerfError, Result};
use actionperf_runtime::registry::MetricRegistry;

mod common;
use common::{CountingBackend, CATEGORY};

fn identity(
    pid: u32,
    resource: &str,
    operation: &str,
    method: &str,
    params: &str,
) -> ActionIdentity {
    ActionIdentity::new(pid, CATEGORY, "API", resource, operation, method, params)
}

struct Named(&'static str);

impl PerformanceMetric for Named {
    fn name(&self) -> &str { self.0 }
    fn on_complete(&self, _: u64, _: bool) -> Result<()> { Ok(()) }
    fn dispose(&self) {}
}

fn named(name: &'static str) -> Result<Box<dyn PerformanceMetric>> {
    Ok(Box::new(Named(name)))
}

/// Backend that panics when asked to open one particular counter.
struct PanicsOn {
    counter: &'static str,
    inner: CountingBackend,
}

impl MetricBackend for PanicsOn {
    fn open_counter(&self, category: &str, counter: &str, instance: &str) -> Result<CounterHandle> {
        if counter == self.counter {
            panic!("backend exploded opening {counter}");
        }
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

#[test]
fn equal_identities_share_one_set() {
    let reg = MetricRegistry::new(Arc::new(CountingBackend::new()));
    let a = reg.get_or_create(&identity(1, "Orders", "Get", "GET", "id=1"));
    let b = reg.get_or_create(&identity(2, "Orders", "Get", "GET", "id=2"));
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.sets_built(), 1);
}

#[test]
fn distinct_identities_get_distinct_sets() {
    let reg = MetricRegistry::new(Arc::new(CountingBackend::new()));
    let base = reg.get_or_create(&identity(1, "Orders", "Get", "GET", ""));
    for other in [
        ActionIdentity::new(1, CATEGORY, "MVC", "Orders", "Get", "GET", ""),
        identity(1, "Users", "Get", "GET", ""),
        identity(1, "Orders", "List", "GET", ""),
        identity(1, "Orders", "Get", "POST", ""),
    ] {
        assert!(!Arc::ptr_eq(&base, &reg.get_or_create(&other)), "{other}");
    }
    assert_eq!(reg.len(), 5);
}

#[test]
fn concurrent_first_access_builds_once() {
    const THREADS: usize = 16;
    let backend = Arc::new(CountingBackend::new());
    let reg = Arc::new(MetricRegistry::new(Arc::clone(&backend) as Arc<dyn MetricBackend>));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let reg = Arc::clone(&reg);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                reg.get_or_create(&identity(i as u32, "Orders", "Get", "GET", ""))
            })
        })
        .collect();
    let sets: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(sets.iter().all(|s| Arc::ptr_eq(s, &sets[0])));
    assert_eq!(reg.sets_built(), 1);
    // 10 metrics, average opens two counters
    assert_eq!(backend.opened(), 11);
    assert_eq!(backend.inner.open_handles(), 11);
}

#[test]
fn unavailable_counter_omits_only_its_metric() {
    let store = common::store(&[backend::CALLS_PER_SECOND]);
    let reg = MetricRegistry::new(store);
    let set = reg.get_or_create(&identity(1, "Orders", "Get", "GET", ""));

    assert_eq!(set.len(), 9);
    let names = set.metric_names();
    assert!(!names.contains(&MetricKind::CallsPerSecond.as_str()));
    assert!(names.contains(&MetricKind::TotalCalls.as_str()));
    assert!(names.contains(&MetricKind::AverageCallTime.as_str()));
}

#[test]
fn missing_category_yields_empty_set() {
    let reg = MetricRegistry::new(Arc::new(actionperf_runtime::backend::InMemoryBackend::new()));
    let set = reg.get_or_create(&identity(1, "Orders", "Get", "GET", ""));
    assert!(set.is_empty());
    assert_eq!(set.notify_start(), 0);
}

#[test]
fn custom_factories_run_in_order_after_standard_metrics() {
    let reg = MetricRegistry::new(Arc::new(CountingBackend::new()));
    reg.add_custom_metric_factory(|_| named("first"));
    reg.add_custom_metric_factory(|_| Err(PerfError::Internal("refused".into())));
    reg.add_custom_metric_factory(|_| panic!("factory exploded"));
    reg.add_custom_metric_factory(|ctx| {
        assert_eq!(ctx.identity.resource(), "Orders");
        named("second")
    });
    assert_eq!(reg.custom_factory_count(), 4);

    let set = reg.get_or_create(&identity(1, "Orders", "Get", "GET", ""));
    let names = set.metric_names();
    assert_eq!(names.len(), 12);
    assert_eq!(&names[10..], &["first", "second"]);
    assert_eq!(names[0], MetricKind::TotalCalls.as_str());
}

#[test]
fn factories_are_not_retroactive() {
    let reg = MetricRegistry::new(Arc::new(CountingBackend::new()));
    let calls = Arc::new(Mutex::new(0));

    let before = reg.get_or_create(&identity(1, "Orders", "Get", "GET", ""));
    let counter = Arc::clone(&calls);
    reg.add_custom_metric_factory(move |_| {
        *counter.lock().unwrap() += 1;
        named("late")
    });

    assert_eq!(before.len(), 10);
    assert_eq!(reg.get_or_create(&identity(1, "Orders", "Get", "GET", "")).len(), 10);

    let after = reg.get_or_create(&identity(1, "Users", "Get", "GET", ""));
    assert_eq!(after.len(), 11);
    reg.get_or_create(&identity(1, "Users", "Get", "GET", ""));
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn cleanup_disposes_and_allows_fresh_sets() {
    let backend = Arc::new(CountingBackend::new());
    let reg = MetricRegistry::new(Arc::clone(&backend) as Arc<dyn MetricBackend>);
    let id = identity(1, "Orders", "Get", "GET", "");

    let old = reg.get_or_create(&id);
    reg.get_or_create(&identity(1, "Users", "Get", "GET", ""));
    assert_eq!(backend.inner.open_handles(), 22);

    reg.cleanup_all();
    assert!(reg.is_empty());
    assert!(old.is_disposed());
    assert_eq!(backend.inner.open_handles(), 0);
    assert!(reg.get(&id).is_none());

    let fresh = reg.get_or_create(&id);
    assert!(!Arc::ptr_eq(&old, &fresh));
    assert!(!fresh.is_disposed());
    assert_eq!(backend.opened(), 33);
}

#[test]
fn backend_panic_omits_only_the_affected_metric() {
    let backend = Arc::new(PanicsOn {
        counter: backend::CALLS_PER_SECOND,
        inner: CountingBackend::new(),
    });
    let reg = MetricRegistry::new(Arc::clone(&backend) as Arc<dyn MetricBackend>);
    let id = identity(1, "Orders", "Get", "GET", "");

    let set = reg.get_or_create(&id);
    assert_eq!(set.len(), 9);
    assert!(!set.metric_names().contains(&MetricKind::CallsPerSecond.as_str()));
    // nine metrics, average holds two counters
    assert_eq!(backend.inner.inner.open_handles(), 10);

    // cached: no rebuild, no further opens
    assert!(Arc::ptr_eq(&set, &reg.get_or_create(&id)));
    assert_eq!(reg.sets_built(), 1);
    assert_eq!(backend.inner.inner.open_handles(), 10);

    reg.cleanup_all();
    assert_eq!(backend.inner.inner.open_handles(), 0);
}

#[test]
fn panic_on_second_counter_releases_the_first() {
    let backend = Arc::new(PanicsOn {
        counter: backend::AVERAGE_TIME_PER_CALL_BASE,
        inner: CountingBackend::new(),
    });
    let reg = MetricRegistry::new(Arc::clone(&backend) as Arc<dyn MetricBackend>);

    let set = reg.get_or_create(&identity(1, "Orders", "Get", "GET", ""));
    assert_eq!(set.len(), 9);
    assert!(!set.metric_names().contains(&MetricKind::AverageCallTime.as_str()));
    assert_eq!(backend.inner.inner.open_handles(), 9);
}
