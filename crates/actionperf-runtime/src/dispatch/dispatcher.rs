use std::collections::hash_map::DefaultHasher;
use std::fmt::Write;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use actionperf_core::error::{PerfError, Result};
use actionperf_core::metrics::MetricSet;

/// How long `shutdown` waits for workers before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// What happened to the invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    Complete { elapsed_ticks: u64, exception: bool },
}

enum Job {
    Notify { set: Arc<MetricSet>, event: Event },
    Barrier(oneshot::Sender<()>),
}

#[derive(Default)]
struct DispatchStats {
    enqueued: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of the dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSnapshot {
    pub enqueued: u64,
    pub processed: u64,
    /// Individual metric callbacks that failed.
    pub failed: u64,
    /// Invocations not recorded because their shard backlog was full.
    pub dropped: u64,
    /// Notifications queued and not yet handled, over all shards.
    pub backlog: u64,
}

/// One worker's queue plus the number of notifications waiting in it.
#[derive(Clone)]
struct Shard {
    tx: mpsc::UnboundedSender<Job>,
    backlog: Arc<AtomicUsize>,
}

impl Shard {
    fn send(&self, job: Job) -> bool {
        self.backlog.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(job).is_err() {
            self.backlog.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }
}

/// Right to send the complete notification of an admitted invocation.
///
/// Completing never waits and is never rejected for lack of room: the start
/// was admitted, so its complete is too. Dropping the ticket sends nothing.
pub struct CompletionTicket {
    set: Arc<MetricSet>,
    shard: Shard,
    stats: Arc<DispatchStats>,
}

impl CompletionTicket {
    pub fn set(&self) -> &Arc<MetricSet> {
        &self.set
    }

    pub fn complete(self, elapsed_ticks: u64, exception: bool) {
        let event = Event::Complete { elapsed_ticks, exception };
        if self.shard.send(Job::Notify { set: self.set, event }) {
            self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        } else {
            tracing::debug!("dispatch worker gone; complete notification discarded");
        }
    }
}

/// Sharded worker pool for metric notifications.
///
/// Each worker owns one queue. Notifications go to the shard picked by their
/// identity, so events of one identity are handled in the order they were
/// queued; in particular an invocation's start is handled before its
/// complete.
///
/// Admission is bounded by backlog, not by running invocations: a start is
/// rejected when its shard already has `queue_capacity` notifications
/// waiting. Completes of admitted invocations are always accepted, so a
/// shard's backlog exceeds the capacity by at most its number of running
/// invocations.
pub struct NotificationDispatcher {
    shards: RwLock<Vec<Shard>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<DispatchStats>,
    queue_capacity: usize,
}

impl NotificationDispatcher {
    /// Start `workers` worker tasks on the current tokio runtime.
    pub fn spawn(workers: usize, queue_capacity: usize) -> Result<Self> {
        let rt = tokio::runtime::Handle::try_current().map_err(|_| PerfError::NoRuntime)?;
        let stats = Arc::new(DispatchStats::default());

        let mut shards = Vec::with_capacity(workers.max(1));
        let mut handles = Vec::with_capacity(workers.max(1));
        for idx in 0..workers.max(1) {
            let (tx, rx) = mpsc::unbounded_channel();
            let shard = Shard { tx, backlog: Arc::new(AtomicUsize::new(0)) };
            handles.push(rt.spawn(run_worker(
                idx,
                rx,
                Arc::clone(&shard.backlog),
                Arc::clone(&stats),
            )));
            shards.push(shard);
        }
        tracing::debug!(workers = shards.len(), queue_capacity, "notification dispatcher started");

        Ok(Self {
            shards: RwLock::new(shards),
            workers: Mutex::new(handles),
            stats,
            queue_capacity: queue_capacity.max(1),
        })
    }

    /// Queue the start notification for `set` and hand back the ticket for
    /// its complete notification.
    pub fn dispatch_start(&self, set: Arc<MetricSet>) -> Result<CompletionTicket> {
        let shard = {
            let shards = self.shards.read().unwrap_or_else(|e| e.into_inner());
            if shards.is_empty() {
                return Err(PerfError::DispatcherClosed);
            }
            shards[shard_for(set.identity(), shards.len())].clone()
        };

        if shard.backlog.fetch_add(1, Ordering::AcqRel) >= self.queue_capacity {
            shard.backlog.fetch_sub(1, Ordering::AcqRel);
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(PerfError::QueueFull);
        }
        let start = Job::Notify { set: Arc::clone(&set), event: Event::Start };
        if shard.tx.send(start).is_err() {
            shard.backlog.fetch_sub(1, Ordering::AcqRel);
            return Err(PerfError::DispatcherClosed);
        }
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);

        Ok(CompletionTicket {
            set,
            shard,
            stats: Arc::clone(&self.stats),
        })
    }

    /// Wait until everything queued before this call has been handled.
    pub async fn flush(&self) {
        let shards: Vec<Shard> = self.shards.read().unwrap_or_else(|e| e.into_inner()).clone();

        let mut waits = FuturesUnordered::new();
        for shard in shards {
            let (done_tx, done_rx) = oneshot::channel();
            if shard.tx.send(Job::Barrier(done_tx)).is_ok() {
                waits.push(done_rx);
            }
        }
        while waits.next().await.is_some() {}
    }

    /// Close the queues and wait for the workers to drain them.
    ///
    /// Outstanding completion tickets keep their queue open; workers still
    /// running after a grace period are aborted.
    pub async fn shutdown(&self) {
        let shards = std::mem::take(&mut *self.shards.write().unwrap_or_else(|e| e.into_inner()));
        drop(shards);

        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        for mut w in workers {
            match timeout(SHUTDOWN_GRACE, &mut w).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "dispatch worker ended abnormally"),
                Err(_) => {
                    tracing::warn!("dispatch worker still busy after grace period; aborting");
                    w.abort();
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shards.read().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    pub fn stats(&self) -> DispatchSnapshot {
        let backlog: usize = self
            .shards
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|s| s.backlog.load(Ordering::Acquire))
            .sum();
        DispatchSnapshot {
            enqueued: self.stats.enqueued.load(Ordering::Relaxed),
            processed: self.stats.processed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            backlog: backlog as u64,
        }
    }

    /// Render dispatcher counters in Prometheus text exposition format.
    pub fn render(&self, out: &mut String) {
        let s = self.stats();
        for (name, v) in [
            ("actionperf_notifications_enqueued_total", s.enqueued),
            ("actionperf_notifications_processed_total", s.processed),
            ("actionperf_metric_failures_total", s.failed),
            ("actionperf_invocations_dropped_total", s.dropped),
        ] {
            let _ = writeln!(out, "# TYPE {} counter\n{} {}", name, name, v);
        }
        let _ = writeln!(
            out,
            "# TYPE actionperf_notification_backlog gauge\nactionperf_notification_backlog {}",
            s.backlog
        );
    }
}

fn shard_for(identity: &str, shards: usize) -> usize {
    let mut h = DefaultHasher::new();
    identity.hash(&mut h);
    (h.finish() % shards as u64) as usize
}

async fn run_worker(
    shard: usize,
    mut rx: mpsc::UnboundedReceiver<Job>,
    backlog: Arc<AtomicUsize>,
    stats: Arc<DispatchStats>,
) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Notify { set, event } => {
                let failed = match event {
                    Event::Start => set.notify_start(),
                    Event::Complete { elapsed_ticks, exception } => {
                        set.notify_complete(elapsed_ticks, exception)
                    }
                };
                backlog.fetch_sub(1, Ordering::AcqRel);
                stats.processed.fetch_add(1, Ordering::Relaxed);
                if failed > 0 {
                    stats.failed.fetch_add(failed as u64, Ordering::Relaxed);
                    tracing::debug!(
                        shard,
                        identity = set.identity(),
                        failed,
                        "notification had failures"
                    );
                }
            }
            Job::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!(shard, "dispatch worker stopped");
}
