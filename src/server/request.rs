use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use http::Method;
use may_minihttp::Request;
use tracing::debug;

use crate::dispatcher::{DispatchRequest, HeaderVec};
use crate::ids::RequestId;

#[derive(Debug)]
pub enum RequestError {
    UnknownMethod(String),
    BodyTooLarge { limit: usize },
    Io(io::Error),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::UnknownMethod(m) => write!(f, "unknown HTTP method `{m}`"),
            RequestError::BodyTooLarge { limit } => {
                write!(f, "request body exceeds {limit} bytes")
            }
            RequestError::Io(e) => write!(f, "failed to read request body: {e}"),
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RequestError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Convert a `may_minihttp` request into a [`DispatchRequest`].
pub fn parse_request(req: Request, max_body_bytes: usize) -> Result<DispatchRequest, RequestError> {
    let method = req.method().to_string();
    let target = req.path().to_string();
    let headers: Vec<(String, Vec<u8>)> = req
        .headers()
        .iter()
        .map(|h| (h.name.to_string(), h.value.to_vec()))
        .collect();

    let mut body = Vec::new();
    req.body()
        .take(max_body_bytes as u64 + 1)
        .read_to_end(&mut body)
        .map_err(RequestError::Io)?;

    build_request(
        &method,
        &target,
        headers.iter().map(|(k, v)| (k.as_str(), v.as_slice())),
        body,
        max_body_bytes,
    )
}

/// Transport-independent part of [`parse_request`].
///
/// Header names are lowercased; a valid `x-request-id` is reused as the
/// correlation id.
pub fn build_request<'h>(
    method: &str,
    target: &str,
    headers: impl IntoIterator<Item = (&'h str, &'h [u8])>,
    body: Vec<u8>,
    max_body_bytes: usize,
) -> Result<DispatchRequest, RequestError> {
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| RequestError::UnknownMethod(method.to_string()))?;
    if body.len() > max_body_bytes {
        return Err(RequestError::BodyTooLarge {
            limit: max_body_bytes,
        });
    }

    let mut collected = HeaderVec::new();
    for (name, value) in headers {
        collected.push((
            Arc::from(name.to_ascii_lowercase()),
            String::from_utf8_lossy(value).into_owned(),
        ));
    }
    let request_id = RequestId::from_header_or_new(
        collected
            .iter()
            .find(|(k, _)| k.as_ref() == "x-request-id")
            .map(|(_, v)| v.as_str()),
    );

    let mut request = DispatchRequest::new(method, target)
        .with_body(body)
        .with_request_id(request_id);
    request.headers = collected;
    debug!(
        request_id = %request_id,
        method = %request.method,
        path = %request.path,
        query_params = request.query.len(),
        headers = request.headers.len(),
        body_bytes = request.body.len(),
        "HTTP request parsed"
    );
    Ok(request)
}
