//! End-to-end dispatch through router, materializer, validator and handler.
//!
//! Every call is answered with a `{code, message, data}` envelope; these
//! tests check the envelope, the HTTP status mirroring its class and whether
//! the handler actually ran.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{calls, get, post, users_dispatcher, CreateUserReq};
use http::Method;
use metaroute::dispatcher::{DispatchRequest, Dispatcher, ErrorCode, HandlerResponse, RequestContext};
use metaroute::ids::RequestId;
use metaroute::meta::Meta;
use metaroute::router::{Controller, Operations, RouterBuilder};
use metaroute::Describe;
use metaroute::middleware::{MetricsMiddleware, Middleware, TracingMiddleware};
use metaroute::validator::{NoValidation, Validatable, ValidationError};
use serde::Deserialize;
use serde_json::json;

#[test]
fn test_query_call_returns_success_envelope() {
    let dispatcher = users_dispatcher();
    let resp = get(&dispatcher, "/api/users?name=Ann");

    assert_eq!(resp.status, 200);
    assert_eq!(
        resp.body,
        json!({"code": 0, "message": "Success", "data": {"name": "Ann", "age": 0}})
    );
    assert_eq!(resp.get_header("content-type"), Some("application/json"));
    assert_eq!(calls(&dispatcher), 1);
}

#[test]
fn test_invalid_query_value_never_reaches_handler() {
    let dispatcher = users_dispatcher();
    let resp = get(&dispatcher, "/api/users?name=Ann&age=abc");

    assert_eq!(resp.code(), Some(ErrorCode::InvalidParameter.code()));
    assert_eq!(resp.status, 400);
    let message = resp.body["message"].as_str().unwrap();
    assert!(message.contains("age"), "message should name the field: {message}");
    assert!(resp.body["data"].is_null());
    assert_eq!(calls(&dispatcher), 0);
}

#[test]
fn test_absent_body_field_takes_zero_value() {
    let dispatcher = users_dispatcher();
    let resp = post(&dispatcher, "/api/users", r#"{"name":"Bob"}"#);

    assert_eq!(resp.code(), Some(0));
    assert_eq!(resp.body["data"], json!({"name": "Bob", "age": 0}));
}

#[test]
fn test_numeric_strings_in_body_are_coerced() {
    let dispatcher = users_dispatcher();
    let resp = post(&dispatcher, "/api/users", r#"{"name":"Cy","age":"41"}"#);
    assert_eq!(resp.body["data"]["age"], 41);
}

#[test]
fn test_empty_numeric_query_value_is_zero() {
    let dispatcher = users_dispatcher();
    let resp = get(&dispatcher, "/api/users?name=Ann&age=");

    assert_eq!(resp.code(), Some(0));
    assert_eq!(resp.body["data"], json!({"name": "Ann", "age": 0}));
    assert_eq!(calls(&dispatcher), 1);
}

#[test]
fn test_malformed_body_is_invalid_request() {
    let dispatcher = users_dispatcher();
    let resp = post(&dispatcher, "/api/users", "{not json");

    assert_eq!(resp.code(), Some(ErrorCode::InvalidRequest.code()));
    assert_eq!(resp.status, 400);
    assert_eq!(calls(&dispatcher), 0);
}

#[test]
fn test_path_variable_binds_and_wins_over_query() {
    let dispatcher = users_dispatcher();

    let resp = get(&dispatcher, "/api/users/42?verbose=true");
    assert_eq!(resp.body["data"]["name"], "user-42 (verbose)");

    let resp = get(&dispatcher, "/api/users/42?id=7");
    assert_eq!(resp.body["data"]["name"], "user-42");
}

#[test]
fn test_missing_required_field() {
    let dispatcher = users_dispatcher();
    let resp = post(&dispatcher, "/api/strict", "{}");

    assert_eq!(resp.code(), Some(ErrorCode::MissingParameter.code()));
    assert_eq!(resp.body["message"], "Name is mandatory");
    assert_eq!(calls(&dispatcher), 0);
}

#[test]
fn test_rule_violation() {
    let dispatcher = users_dispatcher();
    let resp = post(&dispatcher, "/api/strict", r#"{"name":"x","count":11}"#);

    assert_eq!(resp.code(), Some(ErrorCode::ValidationFailed.code()));
    assert_eq!(resp.status, 400);
    assert_eq!(calls(&dispatcher), 0);

    let resp = post(&dispatcher, "/api/strict", r#"{"name":"x","count":10}"#);
    assert_eq!(resp.code(), Some(0));
    assert_eq!(resp.body["data"], json!(null));
}

#[test]
fn test_no_validation_skips_rules() {
    let dispatcher = users_dispatcher().with_validator(Arc::new(NoValidation));
    let resp = post(&dispatcher, "/api/strict", "{}");
    assert_eq!(resp.code(), Some(0));
    assert_eq!(calls(&dispatcher), 1);
}

#[test]
fn test_custom_validator_sees_typed_request() {
    let validator = |target: &Validatable<'_>| -> Result<(), ValidationError> {
        match target.downcast::<CreateUserReq>() {
            Some(req) if req.name == "root" => Err(ValidationError::for_field(
                "name",
                "reserved",
                "The name root is reserved",
            )),
            _ => Ok(()),
        }
    };
    let dispatcher = users_dispatcher().with_validator(Arc::new(validator));

    let resp = post(&dispatcher, "/api/users", r#"{"name":"root"}"#);
    assert_eq!(resp.code(), Some(ErrorCode::ValidationFailed.code()));
    assert_eq!(resp.body["message"], "The name root is reserved");

    let resp = post(&dispatcher, "/api/users", r#"{"name":"ann"}"#);
    assert_eq!(resp.code(), Some(0));
}

#[test]
fn test_handler_error_is_internal() {
    let dispatcher = users_dispatcher();
    let resp = get(&dispatcher, "/api/fail");

    assert_eq!(resp.code(), Some(ErrorCode::Internal.code()));
    assert_eq!(resp.status, 500);
    assert_eq!(resp.body["message"], "database unavailable");
}

#[test]
fn test_handler_panic_is_contained() {
    let dispatcher = users_dispatcher();
    let resp = get(&dispatcher, "/api/panic");

    assert_eq!(resp.code(), Some(ErrorCode::Internal.code()));
    assert!(resp.body["message"]
        .as_str()
        .unwrap()
        .contains("handler exploded"));

    // The dispatcher keeps serving afterwards.
    assert_eq!(get(&dispatcher, "/api/users?name=x").code(), Some(0));
}

#[test]
fn test_response_headers_are_applied() {
    let dispatcher = users_dispatcher();
    let resp = get(&dispatcher, "/api/tagged");

    assert_eq!(resp.code(), Some(0));
    assert_eq!(resp.get_header("x-total-count"), Some("3"));
    assert_eq!(resp.get_header("cache-control"), Some("no-store"));
    assert_eq!(resp.body["data"], json!({"items": ["a", "b", "c"]}));
}

#[test]
fn test_unknown_path_is_not_found() {
    let dispatcher = users_dispatcher();
    let resp = get(&dispatcher, "/api/nowhere");

    assert_eq!(resp.status, 404);
    assert_eq!(resp.code(), Some(ErrorCode::NotFound.code()));
}

#[test]
fn test_wrong_method_lists_allowed() {
    let dispatcher = users_dispatcher();
    let resp = dispatcher.dispatch(DispatchRequest::new(Method::DELETE, "/api/users"));

    assert_eq!(resp.status, 405);
    assert_eq!(resp.code(), Some(ErrorCode::NotSupported.code()));
    let allow = resp.get_header("allow").unwrap();
    assert!(allow.contains("GET"));
    assert!(allow.contains("POST"));
}

#[test]
fn test_request_id_is_echoed() {
    let dispatcher = users_dispatcher();
    let id = RequestId::new();
    let resp =
        dispatcher.dispatch(DispatchRequest::new(Method::GET, "/api/users").with_request_id(id));
    assert_eq!(resp.get_header("x-request-id"), Some(id.to_string().as_str()));

    let resp = get(&dispatcher, "/api/nowhere");
    let minted = resp.get_header("x-request-id").unwrap();
    assert!(minted.parse::<RequestId>().is_ok());
}

struct Gate {
    seen: AtomicUsize,
}

impl Middleware for Gate {
    fn before(&self, ctx: &RequestContext) -> Option<HandlerResponse> {
        ctx.get_header("x-block")
            .map(|_| HandlerResponse::failure(ErrorCode::InvalidRequest, "blocked"))
    }

    fn after(&self, _ctx: &RequestContext, res: &mut HandlerResponse, _latency: Duration) {
        self.seen.fetch_add(1, Ordering::SeqCst);
        res.set_header("x-gate", "passed".to_string());
    }
}

#[test]
fn test_middleware_can_short_circuit() {
    let mut dispatcher = users_dispatcher();
    let gate = Arc::new(Gate {
        seen: AtomicUsize::new(0),
    });
    dispatcher.add_middleware(gate.clone());

    let resp = dispatcher.dispatch(
        DispatchRequest::new(Method::GET, "/api/users?name=Ann").with_header("X-Block", "1"),
    );
    assert_eq!(resp.code(), Some(ErrorCode::InvalidRequest.code()));
    assert_eq!(resp.body["message"], "blocked");
    assert_eq!(resp.get_header("x-gate"), Some("passed"));
    assert_eq!(calls(&dispatcher), 0);

    let resp = get(&dispatcher, "/api/users?name=Ann");
    assert_eq!(resp.code(), Some(0));
    assert_eq!(calls(&dispatcher), 1);
    assert_eq!(gate.seen.load(Ordering::SeqCst), 2);
}

#[test]
fn test_metrics_and_tracing_middleware() {
    let mut dispatcher = users_dispatcher();
    let metrics = Arc::new(MetricsMiddleware::new());
    let tracing = Arc::new(TracingMiddleware::new());
    dispatcher.add_middleware(tracing.clone());
    dispatcher.add_middleware(metrics.clone());

    get(&dispatcher, "/api/users?name=Ann");
    get(&dispatcher, "/api/users?age=abc");
    get(&dispatcher, "/api/nowhere");

    assert_eq!(metrics.request_count(), 3);
    assert_eq!(metrics.code_count(0), 1);
    assert_eq!(metrics.code_count(ErrorCode::InvalidParameter.code()), 1);
    assert_eq!(metrics.code_count(ErrorCode::NotFound.code()), 1);
    assert_eq!(metrics.failure_count(), 2);
    assert_eq!(tracing.in_flight(), 0);
}

#[test]
fn test_concurrent_dispatch_shares_router() {
    let dispatcher = Arc::new(users_dispatcher());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            std::thread::spawn(move || {
                let resp = get(&dispatcher, &format!("/api/users?name=u{i}&age={i}"));
                assert_eq!(resp.body["data"], json!({"name": format!("u{i}"), "age": i}));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(calls(&dispatcher), 8);
}

#[derive(Debug, Deserialize, Describe)]
struct CountReq {
    #[meta(path:"/count" method:"GET")]
    meta: Meta,
}

#[derive(Debug, Deserialize, Describe)]
struct EnabledReq {
    #[meta(path:"/enabled" method:"GET")]
    meta: Meta,
}

struct Stats;

impl Controller for Stats {
    fn operations(ops: &mut Operations<Self>) {
        ops.add("Count", Self::count).add("Enabled", Self::enabled);
    }
}

impl Stats {
    fn count(&self, _ctx: &RequestContext, _req: CountReq) -> anyhow::Result<i64> {
        Ok(-42)
    }

    fn enabled(&self, _ctx: &RequestContext, _req: EnabledReq) -> anyhow::Result<bool> {
        Ok(true)
    }
}

#[test]
fn test_scalar_handler_outputs() {
    let mut builder = RouterBuilder::new();
    builder.register_controller("/stats", Stats).unwrap();
    let dispatcher = Dispatcher::new(Arc::new(builder.build().unwrap()));

    let resp = get(&dispatcher, "/stats/count");
    assert_eq!(
        resp.body,
        json!({"code": 0, "message": "Success", "data": -42})
    );
    let resp = get(&dispatcher, "/stats/enabled");
    assert_eq!(resp.body["data"], json!(true));
}

