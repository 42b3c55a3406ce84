use http::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use super::coerce::{apply_json, apply_query, zero_object};
use super::query::QueryValues;
use super::MaterializeError;
use crate::descriptor::TypeDescriptor;
use crate::meta::{init_meta, ApiRequest};
use crate::router::ParamVec;

/// Raw input of one call, as handed over by the transport.
#[derive(Debug, Clone, Default)]
pub struct RequestInput {
    pub query: QueryValues,
    pub path_params: ParamVec,
    pub body: Vec<u8>,
}

impl RequestInput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = QueryValues::parse(query);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_path_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.path_params.push((name.into(), value.into()));
        self
    }
}

/// A populated request together with the JSON it was decoded from.
#[derive(Debug, Clone)]
pub struct Materialized<R> {
    pub request: R,
    pub value: Value,
}

/// Build a request object of type `R` from one inbound call.
///
/// The route metadata is written into the marker field before returning.
pub fn materialize<R>(method: &Method, input: &RequestInput) -> Result<Materialized<R>, MaterializeError>
where
    R: ApiRequest + DeserializeOwned,
{
    let value = materialize_value(R::descriptor(), method, input)?;
    let mut request = R::deserialize(&value).map_err(MaterializeError::Decode)?;
    init_meta(&mut request).map_err(MaterializeError::Meta)?;
    Ok(Materialized { request, value })
}

/// The JSON object `materialize` deserializes from.
///
/// - GET: query string only
/// - POST, PUT, PATCH: JSON body; an empty body counts as `{}`
/// - DELETE: query string, then the body on top when one is present
///
/// Path variables are applied last for every verb.
pub fn materialize_value(
    desc: &'static TypeDescriptor,
    method: &Method,
    input: &RequestInput,
) -> Result<Value, MaterializeError> {
    let desc = desc.deref();
    if !desc.is_struct() {
        return Err(MaterializeError::NotAStruct {
            type_name: desc.name,
        });
    }

    let mut target = zero_object(desc, 0);
    let mut stack = vec![desc.id];
    match *method {
        Method::GET => {
            apply_query(&mut target, desc, &input.query, &mut stack, 0)?;
        }
        Method::POST | Method::PUT | Method::PATCH => {
            let body = parse_body(&input.body)?.unwrap_or_default();
            apply_json(&mut target, desc, &body, "", 0)?;
        }
        Method::DELETE => {
            apply_query(&mut target, desc, &input.query, &mut stack, 0)?;
            if let Some(body) = parse_body(&input.body)? {
                apply_json(&mut target, desc, &body, "", 0)?;
            }
        }
        _ => return Err(MaterializeError::UnsupportedMethod(method.to_string())),
    }

    if !input.path_params.is_empty() {
        let overlay = QueryValues::from_pairs(
            input
                .path_params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone())),
        );
        apply_query(&mut target, desc, &overlay, &mut stack, 0)?;
    }

    debug!(
        type_name = desc.name,
        method = %method,
        fields = target.len(),
        "Request value assembled"
    );
    Ok(Value::Object(target))
}

fn parse_body(body: &[u8]) -> Result<Option<Map<String, Value>>, MaterializeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(other) => Err(MaterializeError::InvalidBody(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
        Err(e) => Err(MaterializeError::InvalidBody(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
