//! # metaroute
//!
//! **metaroute** turns annotated request types into HTTP routes. Each request
//! struct carries its own route metadata (path, method, summary, tags) in a
//! marker field; registering a controller discovers its operations, builds a
//! route table, and derives an OpenAPI-compatible description of the API. At
//! run time every call is materialized into a typed request, validated,
//! handed to the handler and answered with a uniform
//! `{code, message, data}` envelope.
//!
//! ## Modules
//!
//! - **[`descriptor`]** - Cached type descriptors replacing runtime reflection
//! - **[`meta`]** - Route metadata marker and the `key:"value"` annotation grammar
//! - **[`router`]** - Controller discovery, registration and route matching
//! - **[`materialize`]** - Query/body/path input to typed request objects
//! - **[`validator`]** - Pluggable request validation
//! - **[`dispatcher`]** - Invocation pipeline and the response envelope
//! - **[`middleware`]** - Hooks around every call (tracing, metrics)
//! - **[`openapi`]** - Schema and document generation
//! - **[`server`]** - `may_minihttp` transport
//! - **[`runtime_config`]**, **[`logging`]**, **[`ids`]** - Ambient plumbing
//!
//! ## Declaring operations
//!
//! ```rust,ignore
//! use metaroute::meta::Meta;
//! use metaroute::router::{Controller, Operations};
//! use metaroute::dispatcher::RequestContext;
//! use metaroute::Describe;
//!
//! #[derive(Describe, serde::Deserialize)]
//! struct ListUsersReq {
//!     #[meta(path:"/users" method:"GET" summary:"List users" tags:"users")]
//!     meta: Meta,
//!     #[tag(v:"required" dc:"Name filter")]
//!     name: String,
//!     age: Option<u32>,
//! }
//!
//! #[derive(Describe, serde::Serialize)]
//! struct ListUsersRes {
//!     users: Vec<String>,
//! }
//! impl metaroute::dispatcher::ApiResponse for ListUsersRes {}
//!
//! struct Users;
//!
//! impl Controller for Users {
//!     fn operations(ops: &mut Operations<Self>) {
//!         ops.add("List", Users::list);
//!     }
//! }
//!
//! impl Users {
//!     fn list(&self, _ctx: &RequestContext, req: ListUsersReq) -> anyhow::Result<ListUsersRes> {
//!         Ok(ListUsersRes { users: vec![req.name] })
//!     }
//! }
//! ```
//!
//! Registering `Users` under `/api` serves `GET /api/users`.
//!
//! ## Request flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as server::AppService
//!     participant Dispatcher
//!     participant Router
//!     participant Materializer as materialize
//!     participant Validator
//!     participant Handler
//!
//!     Client->>Server: GET /api/users?name=Ann
//!     Server->>Dispatcher: DispatchRequest
//!     Dispatcher->>Router: route(method, path)
//!     Router-->>Dispatcher: RouteMatch (definition + path params)
//!     Dispatcher->>Materializer: query/body/path -> ListUsersReq
//!     Materializer-->>Dispatcher: request or field-qualified error
//!     Dispatcher->>Validator: validate(request)
//!     Dispatcher->>Handler: list(ctx, request)
//!     Handler-->>Dispatcher: ListUsersRes / error
//!     Dispatcher-->>Server: {code, message, data}
//!     Server-->>Client: HTTP response
//! ```
//!
//! ## Concurrency
//!
//! Registration is single-threaded and completes before the listener starts;
//! [`router::RouterCell`] guards it so it runs once. Afterwards the
//! [`router::Router`] is immutable and shared by `Arc`. Each call allocates its
//! own request object; nothing is shared between concurrent calls.

extern crate self as metaroute;

pub mod descriptor;
pub mod dispatcher;
pub mod ids;
pub mod logging;
pub mod materialize;
pub mod meta;
pub mod middleware;
pub mod openapi;
pub mod router;
pub mod runtime_config;
pub mod server;
pub mod validator;

pub use descriptor::Describe;
pub use dispatcher::{ApiResponse, Dispatcher, Envelope, ErrorCode, RequestContext};
pub use meta::{ApiRequest, Meta};
pub use metaroute_macros::Describe;
pub use router::{Controller, Operations, Router, RouterBuilder, RouterCell};
