use std::time::Duration;

use dashmap::DashMap;
use tracing::{field, info, info_span, Span};

use super::Middleware;
use crate::dispatcher::{HandlerResponse, RequestContext};

/// Opens a `request` span per call and closes it with the outcome.
///
/// Spans are keyed by the dispatch sequence number rather than held in a
/// guard, since a coroutine may resume on a different thread between
/// `before` and `after`. Request ids come from callers and may repeat.
#[derive(Debug, Default)]
pub struct TracingMiddleware {
    open: DashMap<u64, Span>,
}

impl TracingMiddleware {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spans opened by `before` and not yet closed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.open.len()
    }
}

impl Middleware for TracingMiddleware {
    fn before(&self, ctx: &RequestContext) -> Option<HandlerResponse> {
        let span = info_span!(
            "request",
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            handler = %ctx.handler_name,
            status = field::Empty,
            code = field::Empty,
            latency_ms = field::Empty,
        );
        self.open.insert(ctx.seq, span);
        None
    }

    fn after(&self, ctx: &RequestContext, res: &mut HandlerResponse, latency: Duration) {
        let span = self
            .open
            .remove(&ctx.seq)
            .map(|(_, span)| span)
            .unwrap_or_else(Span::none);
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        span.record("status", res.status);
        span.record("latency_ms", latency_ms);
        if let Some(code) = res.code() {
            span.record("code", code);
        }
        span.in_scope(|| {
            info!(
                status = res.status,
                latency_ms,
                "Request completed"
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;
    use crate::ids::RequestId;

    fn ctx(request_id: RequestId, seq: u64) -> RequestContext {
        RequestContext {
            request_id,
            seq,
            method: Method::GET,
            path: "/api/users".to_string(),
            handler_name: "Users.List".to_string(),
            path_params: Default::default(),
            headers: Default::default(),
        }
    }

    #[test]
    fn test_shared_request_id_keeps_spans_apart() {
        let mw = TracingMiddleware::new();
        let id = RequestId::new();
        let (first, second) = (ctx(id, 1), ctx(id, 2));

        mw.before(&first);
        mw.before(&second);
        assert_eq!(mw.in_flight(), 2);

        let mut res = HandlerResponse::success(serde_json::Value::Null);
        mw.after(&first, &mut res, Duration::from_millis(1));
        assert_eq!(mw.in_flight(), 1);
        mw.after(&second, &mut res, Duration::from_millis(1));
        assert_eq!(mw.in_flight(), 0);
    }
}
