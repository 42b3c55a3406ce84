use std::io;
use std::sync::Arc;

use may_minihttp::{HttpService, Request, Response};
use serde_json::{json, Value};
use tracing::{error, warn};

use super::request::{parse_request, RequestError};
use super::response::{write_handler_response, write_json};
use crate::dispatcher::{Dispatcher, Envelope, ErrorCode};
use crate::openapi::ApiDocument;
use crate::runtime_config::RuntimeConfig;

/// `may_minihttp` service in front of a [`Dispatcher`].
///
/// Besides dispatched routes it answers `GET /health` and `GET <docs_path>`.
#[derive(Clone)]
pub struct AppService {
    pub dispatcher: Arc<Dispatcher>,
    /// Generated once at startup
    pub document: Arc<Value>,
    pub docs_path: Arc<str>,
    pub max_body_bytes: usize,
}

impl AppService {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        document: &ApiDocument,
        config: &RuntimeConfig,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            dispatcher,
            document: Arc::new(serde_json::to_value(document)?),
            docs_path: Arc::from(config.docs_path.as_str()),
            max_body_bytes: config.max_body_bytes,
        })
    }
}

/// Basic health check returning `{ "status": "ok" }`.
pub fn health_endpoint(res: &mut Response) -> io::Result<()> {
    write_json(res, 200, &json!({ "status": "ok" }));
    Ok(())
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        if req.method() == "GET" {
            let path = req.path().split('?').next().unwrap_or("/");
            if path == "/health" {
                return health_endpoint(res);
            }
            if path == &*self.docs_path {
                write_json(res, 200, &self.document);
                return Ok(());
            }
        }

        let request = match parse_request(req, self.max_body_bytes) {
            Ok(request) => request,
            Err(e) => {
                let (status, code) = match &e {
                    RequestError::BodyTooLarge { .. } => (413, ErrorCode::InvalidRequest),
                    RequestError::UnknownMethod(_) => (405, ErrorCode::NotSupported),
                    RequestError::Io(_) => (400, ErrorCode::InvalidRequest),
                };
                warn!(error = %e, status, "Request rejected before dispatch");
                let body = Envelope::failure(code, e.to_string()).into_value();
                write_json(res, status, &body);
                return Ok(());
            }
        };

        let response = self.dispatcher.dispatch(request);
        if response.status >= 500 {
            error!(status = response.status, "Dispatch answered with server error");
        }
        write_handler_response(res, &response);
        Ok(())
    }
}
