use dashmap::DashMap;
use may_minihttp::Response;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::{error, warn};

use crate::dispatcher::HandlerResponse;

/// Distinct header lines kept for the life of the process.
pub const MAX_INTERNED_HEADER_LINES: usize = 1024;

/// Headers whose value differs on every call.
///
/// The response writer only takes `'static` header lines, so these stay on
/// the in-process [`HandlerResponse`] and are not written to the wire.
const PER_CALL_HEADERS: [&str; 2] = ["x-request-id", "content-length"];

static HEADER_LINES: Lazy<DashMap<String, &'static str>> = Lazy::new(DashMap::new);

pub(crate) fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// `Name: value` as a `'static` line, reusing earlier copies.
///
/// Returns `None` once the table is full and the line is new.
pub(crate) fn header_line(name: &str, value: &str) -> Option<&'static str> {
    let line = format!("{name}: {value}");
    if let Some(existing) = HEADER_LINES.get(&line) {
        return Some(*existing);
    }
    if HEADER_LINES.len() >= MAX_INTERNED_HEADER_LINES {
        warn!(header = %name, "Header table full, header dropped");
        return None;
    }
    let leaked = line.clone();
    let entry = HEADER_LINES
        .entry(line)
        .or_insert_with(|| Box::leak(leaked.into_boxed_str()));
    Some(*entry)
}

pub fn write_handler_response(res: &mut Response, resp: &HandlerResponse) {
    res.status_code(usize::from(resp.status), status_reason(resp.status));
    let mut has_content_type = false;
    for (name, value) in &resp.headers {
        if PER_CALL_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        if name.eq_ignore_ascii_case("content-type") {
            has_content_type = true;
            if value == "application/json" {
                res.header("Content-Type: application/json");
                continue;
            }
        }
        if let Some(line) = header_line(name, value) {
            res.header(line);
        }
    }
    if !has_content_type {
        res.header("Content-Type: application/json");
    }
    write_body(res, &resp.body);
}

pub fn write_json(res: &mut Response, status: u16, body: &Value) {
    res.status_code(usize::from(status), status_reason(status));
    res.header("Content-Type: application/json");
    write_body(res, body);
}

fn write_body(res: &mut Response, body: &Value) {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            res.body_vec(bytes);
        }
        Err(e) => {
            error!(error = %e, "Response body serialization failed");
            res.status_code(500, status_reason(500));
            res.body(r#"{"code":50,"message":"response encoding failed","data":null}"#);
        }
    }
}
