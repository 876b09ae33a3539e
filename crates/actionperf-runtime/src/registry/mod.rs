//! Identity -> metric set cache.
//!
//! Lookups of known identities go straight to the `DashMap`. A miss takes the
//! registry build lock and checks again before constructing, so each identity
//! is built at most once no matter how many invocations race on first sight.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;

use actionperf_core::backend::MetricBackend;
use actionperf_core::error::{PerfError, Result};
use actionperf_core::metrics::{
    MetricContext, MetricFactory, MetricKind, MetricSet, PerformanceMetric, StandardMetric,
};
use actionperf_core::ActionIdentity;

pub struct MetricRegistry {
    backend: Arc<dyn MetricBackend>,
    sets: DashMap<Arc<str>, Arc<MetricSet>>,
    factories: RwLock<Vec<MetricFactory>>,
    build_lock: Mutex<()>,
    built: AtomicU64,
}

impl MetricRegistry {
    pub fn new(backend: Arc<dyn MetricBackend>) -> Self {
        Self {
            backend,
            sets: DashMap::new(),
            factories: RwLock::new(Vec::new()),
            build_lock: Mutex::new(()),
            built: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> Arc<dyn MetricBackend> {
        Arc::clone(&self.backend)
    }

    /// Return the metric set for `identity`, building it on first sight.
    pub fn get_or_create(&self, identity: &ActionIdentity) -> Arc<MetricSet> {
        if let Some(set) = self.sets.get(identity.raw_name()) {
            return Arc::clone(set.value());
        }

        let _guard = self.build_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(set) = self.sets.get(identity.raw_name()) {
            return Arc::clone(set.value());
        }

        let set = Arc::new(self.build(identity));
        self.sets.insert(identity.raw_name_arc(), Arc::clone(&set));
        self.built.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(identity = %identity, metrics = set.len(), "metric set created");
        set
    }

    /// Cached set for `identity`, without creating one.
    pub fn get(&self, identity: &ActionIdentity) -> Option<Arc<MetricSet>> {
        self.sets.get(identity.raw_name()).map(|r| Arc::clone(r.value()))
    }

    /// Register a constructor for an extra metric.
    ///
    /// Only sets created after this call get the metric; cached sets are not
    /// rebuilt.
    pub fn add_custom_metric_factory<F>(&self, factory: F)
    where
        F: Fn(&MetricContext) -> Result<Box<dyn PerformanceMetric>> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write().unwrap_or_else(|e| e.into_inner());
        factories.push(Arc::new(factory));
    }

    pub fn custom_factory_count(&self) -> usize {
        self.factories.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Total number of metric sets constructed so far.
    pub fn sets_built(&self) -> u64 {
        self.built.load(Ordering::Relaxed)
    }

    /// Dispose every cached set, empty the cache and release shared backend
    /// resources.
    ///
    /// Callers must stop starting new trackers first: an identity seen for
    /// the first time while this runs may be cached after the sweep.
    pub fn cleanup_all(&self) {
        let _guard = self.build_lock.lock().unwrap_or_else(|e| e.into_inner());

        let sets: Vec<Arc<MetricSet>> = self.sets.iter().map(|r| Arc::clone(r.value())).collect();
        for set in &sets {
            set.dispose();
        }
        self.sets.clear();
        self.backend.close_shared_resources();
        tracing::info!(disposed = sets.len(), "metric registry cleaned up");
    }

    fn build(&self, identity: &ActionIdentity) -> MetricSet {
        let ctx = MetricContext::new(identity.clone(), Arc::clone(&self.backend));
        let mut metrics: Vec<Box<dyn PerformanceMetric>> =
            Vec::with_capacity(MetricKind::ALL.len());

        for kind in MetricKind::ALL {
            let res = catch_unwind(AssertUnwindSafe(|| StandardMetric::open(kind, &ctx)))
                .unwrap_or_else(|payload| Err(PerfError::from_panic(payload)));
            match res {
                Ok(m) => metrics.push(Box::new(m)),
                Err(e) => tracing::warn!(
                    identity = %identity,
                    metric = kind.as_str(),
                    class = e.class().as_str(),
                    error = %e,
                    "metric omitted"
                ),
            }
        }

        let factories: Vec<MetricFactory> =
            self.factories.read().unwrap_or_else(|e| e.into_inner()).clone();
        for (idx, factory) in factories.iter().enumerate() {
            let res = catch_unwind(AssertUnwindSafe(|| factory(&ctx)))
                .unwrap_or_else(|payload| Err(PerfError::from_panic(payload)));
            match res {
                Ok(m) => metrics.push(m),
                Err(e) => tracing::warn!(
                    identity = %identity,
                    factory = idx,
                    class = e.class().as_str(),
                    error = %e,
                    "custom metric omitted"
                ),
            }
        }

        MetricSet::new(identity.raw_name_arc(), metrics)
    }
}
