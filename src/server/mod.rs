//! # HTTP Adapter
//!
//! Serves a [`Dispatcher`](crate::dispatcher::Dispatcher) over HTTP with
//! `may_minihttp`, one coroutine per connection.
//!
//! The adapter turns wire requests into
//! [`DispatchRequest`](crate::dispatcher::DispatchRequest)s, enforces the
//! body size limit and writes back whatever envelope the dispatcher returns.

mod http_server;
mod request;
mod response;
mod service;

use std::io;
use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::openapi::ApiDocument;
use crate::runtime_config::RuntimeConfig;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{build_request, parse_request, RequestError};
pub use response::{write_handler_response, write_json, MAX_INTERNED_HEADER_LINES};
pub use service::{health_endpoint, AppService};

/// Apply the runtime settings and start listening on `config.bind`.
pub fn serve(
    dispatcher: Arc<Dispatcher>,
    document: &ApiDocument,
    config: &RuntimeConfig,
) -> io::Result<ServerHandle> {
    may::config().set_stack_size(config.stack_size);
    let service = AppService::new(dispatcher, document, config)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    HttpServer(service).start(config.bind.as_str())
}
