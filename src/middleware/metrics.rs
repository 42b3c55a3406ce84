use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use super::Middleware;
use crate::dispatcher::{HandlerResponse, RequestContext};

/// Counts dispatched calls by envelope code and accumulates latency.
///
/// Counters use relaxed atomics; readings are eventually consistent.
#[derive(Debug, Default)]
pub struct MetricsMiddleware {
    request_count: AtomicUsize,
    total_latency_ns: AtomicU64,
    stack_size: AtomicUsize,
    by_code: DashMap<i32, usize>,
}

impl MetricsMiddleware {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Calls answered with a non-zero envelope code.
    pub fn failure_count(&self) -> usize {
        self.by_code
            .iter()
            .filter(|e| *e.key() != 0)
            .map(|e| *e.value())
            .sum()
    }

    /// Calls answered with envelope `code`.
    pub fn code_count(&self, code: i32) -> usize {
        self.by_code.get(&code).map(|c| *c).unwrap_or(0)
    }

    /// Mean latency, zero before the first call completes.
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    /// Stack size of the coroutine that served the last call.
    pub fn stack_size(&self) -> usize {
        self.stack_size.load(Ordering::Relaxed)
    }
}

impl Middleware for MetricsMiddleware {
    fn before(&self, _ctx: &RequestContext) -> Option<HandlerResponse> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn after(&self, _ctx: &RequestContext, res: &mut HandlerResponse, latency: Duration) {
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.total_latency_ns.fetch_add(nanos, Ordering::Relaxed);
        if let Some(code) = res.code() {
            *self.by_code.entry(code).or_insert(0) += 1;
        }
        let size = if may::coroutine::is_coroutine() {
            may::coroutine::current().stack_size()
        } else {
            may::config().get_stack_size()
        };
        self.stack_size.store(size, Ordering::Relaxed);
    }
}
