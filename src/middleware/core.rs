use std::time::Duration;

use crate::dispatcher::{HandlerResponse, RequestContext};

/// Hooks around every dispatched call.
///
/// `before` runs for every middleware in order; the first `Some` response
/// short-circuits the handler. `after` always runs, including for
/// unmatched routes and early responses.
pub trait Middleware: Send + Sync {
    fn before(&self, _ctx: &RequestContext) -> Option<HandlerResponse> {
        None
    }
    fn after(&self, _ctx: &RequestContext, _res: &mut HandlerResponse, _latency: Duration) {}
}
