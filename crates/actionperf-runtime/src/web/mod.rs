//! HTTP integration.
//!
//! Responsibilities:
//! - Derive an action identity from request metadata
//! - Keep one tracker per in-flight request, keyed by a request key
//! - Start before the handler, complete after it (5xx counts as a failure)
//!
//! Complete for an unknown key means the request was never tracked; it is
//! ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{MatchedPath, Request, State},
    http::header::HOST,
    middleware::Next,
    response::Response,
    Router,
};
use dashmap::DashMap;

use actionperf_core::ActionIdentity;

use crate::monitor::PerfMonitor;
use crate::tracker::PerformanceTracker;

/// Key of one in-flight request: process id plus a per-process sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub process_id: u32,
    pub seq: u64,
}

pub struct WebPerformanceTracker {
    monitor: PerfMonitor,
    in_flight: DashMap<RequestKey, PerformanceTracker>,
    seq: AtomicU64,
}

impl WebPerformanceTracker {
    pub fn new(monitor: PerfMonitor) -> Self {
        Self {
            monitor,
            in_flight: DashMap::new(),
            seq: AtomicU64::new(1),
        }
    }

    pub fn monitor(&self) -> &PerfMonitor {
        &self.monitor
    }

    pub fn next_key(&self) -> RequestKey {
        RequestKey {
            process_id: self.monitor.process_id(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Number of requests started and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn process_action_start(&self, key: RequestKey, identity: ActionIdentity) {
        let mut tracker = self.monitor.tracker(identity);
        tracker.start();
        if let Some(stale) = self.in_flight.insert(key, tracker) {
            // dropping a running tracker completes it as failed
            tracing::debug!(
                ?key,
                identity = %stale.identity(),
                "request key reused; previous tracker abandoned"
            );
        }
    }

    pub fn process_action_complete(&self, key: RequestKey, unhandled_exception: bool) {
        match self.in_flight.remove(&key) {
            Some((_, mut tracker)) => tracker.complete(unhandled_exception),
            None => tracing::trace!(?key, "no tracker for request; not tracking"),
        }
    }

    /// Identity for a request: resource is the host, operation the matched
    /// route (or the raw path when routing has not happened yet).
    pub fn identity_from_request<B>(&self, req: &axum::http::Request<B>) -> ActionIdentity {
        let host = req
            .headers()
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| req.uri().host())
            .map(strip_port)
            .unwrap_or("localhost");

        let operation = req
            .extensions()
            .get::<MatchedPath>()
            .map(|m| m.as_str())
            .unwrap_or_else(|| req.uri().path());

        self.monitor.identity(
            host,
            operation,
            req.method().as_str(),
            req.uri().query().unwrap_or(""),
        )
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // [v6]:port
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) => h,
        _ => host,
    }
}

/// Completes the request as failed if the handler future is dropped early.
struct CompletionGuard {
    web: Arc<WebPerformanceTracker>,
    key: RequestKey,
    armed: bool,
}

impl CompletionGuard {
    fn finish(mut self, unhandled_exception: bool) {
        self.armed = false;
        self.web.process_action_complete(self.key, unhandled_exception);
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.armed {
            self.web.process_action_complete(self.key, true);
        }
    }
}

/// Middleware: track every routed request. Install with `route_layer` so the
/// matched route is known.
pub async fn track_actions(
    State(web): State<Arc<WebPerformanceTracker>>,
    req: Request,
    next: Next,
) -> Response {
    let key = web.next_key();
    let identity = web.identity_from_request(&req);
    web.process_action_start(key, identity);

    let guard = CompletionGuard { web, key, armed: true };
    let res = next.run(req).await;
    guard.finish(res.status().is_server_error());
    res
}

/// Wrap every route of `router` with [`track_actions`].
pub fn instrument<S>(router: Router<S>, web: Arc<WebPerformanceTracker>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(axum::middleware::from_fn_with_state(web, track_actions))
}

#[cfg(test)]
mod tests {
    use super::strip_port;

    #[test]
    fn ports_are_stripped() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
        assert_eq!(strip_port("[::1]"), "[::1]");
    }
}
