//! # Dispatcher
//!
//! Answers one inbound call with a `{code, message, data}` envelope.
//!
//! ## Request flow
//!
//! 1. The [`Router`](crate::router::Router) matches method and path. No match
//!    yields `NotFound` (65); a path served under another verb yields
//!    `NotSupported` (59) with an `allow` header.
//! 2. Middleware `before` hooks run; the first response returned wins.
//! 3. The operation's invoker materializes the request, runs the
//!    [`Validator`](crate::validator::Validator) and calls the handler.
//! 4. The handler output is wrapped as `{code: 0, message: "Success", data}`.
//!    Headers from [`ApiResponse::headers`] are applied first.
//! 5. Failures map onto [`ErrorCode`]; the HTTP status mirrors the class.
//! 6. `x-request-id` is set and middleware `after` hooks run.
//!
//! Handler panics are caught and reported as `Internal` (50). Nothing is
//! retried.

mod core;
mod envelope;

pub use core::{
    ApiResponse, DispatchFailure, DispatchRequest, Dispatcher, HandlerOutput, HandlerResponse,
    HeaderVec, Invocation, RequestContext, MAX_INLINE_HEADERS,
};
pub use envelope::{Envelope, ErrorCode};
