use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Method;
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;
use tracing::{debug, error, info, warn};

use super::envelope::{Envelope, ErrorCode};
use crate::ids::RequestId;
use crate::materialize::{MaterializeError, QueryValues, RequestInput};
use crate::middleware::Middleware;
use crate::router::{ParamVec, Router};
use crate::validator::{RuleValidator, ValidationError, Validator};

/// Maximum inline headers before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Header storage shared by requests and responses.
///
/// Names are `Arc<str>` so the common ones clone without copying.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Per-call context handed to middleware and handlers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    /// Unique per dispatch, even when a caller reuses a request id
    pub seq: u64,
    pub method: Method,
    /// Request path as received
    pub path: String,
    /// `Controller.Operation`, empty when no route matched
    pub handler_name: String,
    pub path_params: ParamVec,
    pub headers: HeaderVec,
}

impl RequestContext {
    /// Get a header by name (case-insensitive)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Last value bound to path variable `name`.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Status, headers and envelope body of one answered call.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerResponse {
    pub status: u16,
    #[serde(skip_serializing)]
    pub headers: HeaderVec,
    pub body: Value,
}

impl HandlerResponse {
    #[must_use]
    pub fn new(status: u16, headers: HeaderVec, body: Value) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// JSON response with a `content-type` header.
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("content-type"), "application/json".to_string()));
        Self {
            status,
            headers,
            body,
        }
    }

    /// Success envelope wrapping `data`.
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self::json(
            ErrorCode::Ok.http_status(),
            Envelope::success(data).into_value(),
        )
    }

    /// Failure envelope with the status matching `code`.
    #[must_use]
    pub fn failure(code: ErrorCode, message: &str) -> Self {
        Self::json(
            code.http_status(),
            Envelope::failure(code, message).into_value(),
        )
    }

    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header.
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }

    /// The envelope `code`, if the body is an envelope.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        self.body
            .get("code")
            .and_then(Value::as_i64)
            .and_then(|c| i32::try_from(c).ok())
    }
}

/// Success output of a handler.
///
/// `headers` lets a response type attach HTTP headers; they are applied
/// before the envelope is encoded.
pub trait ApiResponse: Serialize {
    fn headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

impl ApiResponse for () {}
impl ApiResponse for String {}
impl ApiResponse for Value {}
impl<T: Serialize> ApiResponse for Vec<T> {}
impl<K: Serialize, V: Serialize> ApiResponse for BTreeMap<K, V> {}

macro_rules! impl_api_response {
    ($($t:ty),* $(,)?) => {
        $(impl ApiResponse for $t {})*
    };
}

impl_api_response!(
    bool, char, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64
);

impl<T: ApiResponse> ApiResponse for Option<T> {
    fn headers(&self) -> Vec<(String, String)> {
        self.as_ref().map(ApiResponse::headers).unwrap_or_default()
    }
}

/// Everything an invoker needs for one call.
#[derive(Clone, Copy)]
pub struct Invocation<'a> {
    pub ctx: &'a RequestContext,
    pub input: &'a RequestInput,
    pub validator: &'a dyn Validator,
}

/// Encoded handler result plus the headers it asked for.
#[derive(Debug, Clone)]
pub struct HandlerOutput {
    pub data: Value,
    pub headers: Vec<(String, String)>,
}

/// Why an invocation did not produce a success envelope.
#[derive(Debug)]
pub enum DispatchFailure {
    Materialize(MaterializeError),
    Validation(ValidationError),
    Handler(anyhow::Error),
    Encode(serde_json::Error),
}

impl DispatchFailure {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            DispatchFailure::Materialize(e) => match e {
                MaterializeError::UnsupportedMethod(_) => ErrorCode::NotSupported,
                MaterializeError::InvalidBody(_) => ErrorCode::InvalidRequest,
                MaterializeError::Field { .. } | MaterializeError::Decode(_) => {
                    ErrorCode::InvalidParameter
                }
                MaterializeError::NotAStruct { .. } | MaterializeError::Meta(_) => {
                    ErrorCode::Internal
                }
            },
            DispatchFailure::Validation(e) if e.is_missing() => ErrorCode::MissingParameter,
            DispatchFailure::Validation(_) => ErrorCode::ValidationFailed,
            DispatchFailure::Handler(_) | DispatchFailure::Encode(_) => ErrorCode::Internal,
        }
    }
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchFailure::Materialize(e) => write!(f, "{e}"),
            DispatchFailure::Validation(e) => write!(f, "{e}"),
            DispatchFailure::Handler(e) => write!(f, "{e}"),
            DispatchFailure::Encode(e) => write!(f, "response encoding failed: {e}"),
        }
    }
}

impl std::error::Error for DispatchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchFailure::Materialize(e) => Some(e),
            DispatchFailure::Validation(e) => Some(e),
            DispatchFailure::Handler(e) => Some(&**e),
            DispatchFailure::Encode(e) => Some(e),
        }
    }
}

/// One inbound call as delivered by a transport.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub method: Method,
    pub path: String,
    pub query: QueryValues,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
    /// Correlation id; a fresh one is generated when absent
    pub request_id: Option<RequestId>,
}

impl DispatchRequest {
    /// Split `target` (`/path?query`) into path and query.
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Self {
            method,
            path: path.to_string(),
            query: QueryValues::parse(query),
            headers: HeaderVec::new(),
            body: Vec::new(),
            request_id: None,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((Arc::from(name), value.into()));
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

/// Runs matched calls through materialization, validation and the handler,
/// and answers every call with an envelope.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
    validator: Arc<dyn Validator>,
    middlewares: Vec<Arc<dyn Middleware>>,
    next_seq: Arc<AtomicU64>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.router.len())
            .field("middlewares", &self.middlewares.len())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatcher using [`RuleValidator`].
    #[must_use]
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            validator: Arc::new(RuleValidator),
            middlewares: Vec::new(),
            next_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    /// Append a middleware; they run in insertion order.
    pub fn add_middleware(&mut self, mw: Arc<dyn Middleware>) {
        self.middlewares.push(mw);
    }

    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Answer one call. Never fails: every outcome is an envelope.
    pub fn dispatch(&self, request: DispatchRequest) -> HandlerResponse {
        let request_id = request.request_id.unwrap_or_default();
        let route = self.router.route(&request.method, &request.path);

        let ctx = RequestContext {
            request_id,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            method: request.method.clone(),
            path: request.path.clone(),
            handler_name: route
                .as_ref()
                .map(|r| r.definition.handler_name.clone())
                .unwrap_or_default(),
            path_params: route
                .as_ref()
                .map(|r| r.path_params.clone())
                .unwrap_or_default(),
            headers: request.headers,
        };

        let mut early: Option<HandlerResponse> = None;
        for (idx, mw) in self.middlewares.iter().enumerate() {
            let resp = mw.before(&ctx);
            if early.is_none() && resp.is_some() {
                debug!(
                    request_id = %ctx.request_id,
                    middleware_idx = idx,
                    "Middleware returned early response"
                );
                early = resp;
            }
        }

        let start = Instant::now();
        let mut resp = match (early, route) {
            (Some(resp), _) => resp,
            (None, None) => self.unmatched(&ctx),
            (None, Some(route)) => {
                info!(
                    request_id = %ctx.request_id,
                    handler_name = %ctx.handler_name,
                    method = %ctx.method,
                    path = %ctx.path,
                    "Request dispatched to handler"
                );
                let input = RequestInput {
                    query: request.query,
                    path_params: route.path_params,
                    body: request.body,
                };
                let invocation = Invocation {
                    ctx: &ctx,
                    input: &input,
                    validator: self.validator.as_ref(),
                };
                match (route.definition.invoker)(&invocation) {
                    Ok(output) => encode_success(&ctx, output),
                    Err(failure) => encode_failure(&ctx, &failure),
                }
            }
        };
        let latency: Duration = start.elapsed();

        resp.set_header("x-request-id", ctx.request_id.to_string());
        for mw in &self.middlewares {
            mw.after(&ctx, &mut resp, latency);
        }
        resp
    }

    fn unmatched(&self, ctx: &RequestContext) -> HandlerResponse {
        let allowed = self.router.allowed_methods(&ctx.path);
        if allowed.is_empty() {
            warn!(
                request_id = %ctx.request_id,
                method = %ctx.method,
                path = %ctx.path,
                "Route not found"
            );
            return HandlerResponse::failure(
                ErrorCode::NotFound,
                &format!("no route for {} {}", ctx.method, ctx.path),
            );
        }
        let allow = allowed
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        warn!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            allow = %allow,
            "Method not allowed"
        );
        let mut resp = HandlerResponse::failure(
            ErrorCode::NotSupported,
            &format!("method {} is not allowed on {}", ctx.method, ctx.path),
        );
        resp.set_header("allow", allow);
        resp
    }
}

fn encode_success(ctx: &RequestContext, output: HandlerOutput) -> HandlerResponse {
    let mut resp = HandlerResponse::success(output.data);
    let custom = output.headers.len();
    for (name, value) in output.headers {
        resp.set_header(&name, value);
    }
    debug!(
        request_id = %ctx.request_id,
        handler_name = %ctx.handler_name,
        custom_headers = custom,
        "Success envelope encoded"
    );
    resp
}

fn encode_failure(ctx: &RequestContext, failure: &DispatchFailure) -> HandlerResponse {
    let code = failure.code();
    let message = failure.to_string();
    if code.is_client_error() {
        warn!(
            request_id = %ctx.request_id,
            handler_name = %ctx.handler_name,
            code = code.code(),
            error = %message,
            "Request rejected"
        );
    } else {
        error!(
            request_id = %ctx.request_id,
            handler_name = %ctx.handler_name,
            code = code.code(),
            error = %message,
            "Request failed"
        );
    }
    HandlerResponse::failure(code, &message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_request_splits_target() {
        let req = DispatchRequest::new(Method::GET, "/api/users?name=Ann&age=3")
            .with_header("X-Trace", "1");
        assert_eq!(req.path, "/api/users");
        assert_eq!(req.query.last("name"), Some("Ann"));
        assert_eq!(req.headers.len(), 1);
        assert!(req.request_id.is_none());
    }

    #[test]
    fn test_set_header_replaces_case_insensitively() {
        let mut resp = HandlerResponse::success(Value::Null);
        resp.set_header("Content-Type", "text/plain".to_string());
        assert_eq!(resp.get_header("content-type"), Some("text/plain"));
        assert_eq!(resp.headers.len(), 1);
        assert_eq!(resp.code(), Some(0));
    }

    #[test]
    fn test_envelope_code_reads_as_i32() {
        let resp = HandlerResponse::failure(ErrorCode::NotFound, "gone");
        assert_eq!(resp.code(), Some(ErrorCode::NotFound.code()));
        let foreign = HandlerResponse::json(200, serde_json::json!({"code": i64::MAX}));
        assert_eq!(foreign.code(), None);
        assert_eq!(HandlerResponse::json(200, Value::Null).code(), None);
    }

    #[test]
    fn test_failure_code_mapping() {
        let missing = DispatchFailure::Validation(ValidationError::for_field(
            "name", "required", "missing",
        ));
        assert_eq!(missing.code(), ErrorCode::MissingParameter);
        let invalid = DispatchFailure::Validation(ValidationError::new("bad"));
        assert_eq!(invalid.code(), ErrorCode::ValidationFailed);
        let verb = DispatchFailure::Materialize(MaterializeError::UnsupportedMethod("HEAD".into()));
        assert_eq!(verb.code(), ErrorCode::NotSupported);
        let body = DispatchFailure::Materialize(MaterializeError::InvalidBody("x".into()));
        assert_eq!(body.code(), ErrorCode::InvalidRequest);
        let handler = DispatchFailure::Handler(anyhow::anyhow!("boom"));
        assert_eq!(handler.code(), ErrorCode::Internal);
        assert_eq!(handler.to_string(), "boom");
    }

    #[test]
    fn test_option_response_headers() {
        struct Tagged;
        impl Serialize for Tagged {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_unit()
            }
        }
        impl ApiResponse for Tagged {
            fn headers(&self) -> Vec<(String, String)> {
                vec![("x-tag".into(), "1".into())]
            }
        }
        assert_eq!(Some(Tagged).headers().len(), 1);
        assert!(None::<Tagged>.headers().is_empty());
    }
}
