//! # Request Materialization
//!
//! Turns one inbound call (query string, JSON body, path variables) into a
//! typed request object.
//!
//! The materializer never assigns Rust fields directly. It assembles a JSON
//! object shaped by the request type's descriptor, starting from the zero
//! value of every field and layering the verb's input sources on top with
//! kind-directed coercion. serde then decodes that object into the request
//! type, and the route metadata is written into the marker field.
//!
//! ## Query conventions
//!
//! | Field kind | Query form |
//! |---|---|
//! | scalar, time | `name=value` (last one wins) |
//! | slice | `name=a&name=b` or `name[]=a&name[]=b` |
//! | map | `name[key]=value` |
//! | nested struct | its own fields, in the same flat namespace |
//!
//! ## Coercion
//!
//! Strings, numbers and booleans convert into each other where the text
//! allows it (`"42"` into an integer, `1` into `true`). Time fields accept
//! RFC3339, `YYYY-MM-DD HH:MM:SS`, bare dates and Unix seconds. A value that
//! cannot be converted fails the whole call with a [`MaterializeError::Field`]
//! naming the input (`age`, `ids[1]`, `address.zip`, `scores[math]`).

mod coerce;
mod core;
mod query;

use std::fmt;

use serde_json::Value;

use crate::meta::MetaError;

pub use coerce::{coerce, zero_value};
pub use core::{materialize, materialize_value, Materialized, RequestInput};
pub use query::QueryValues;

#[derive(Debug)]
pub enum MaterializeError {
    UnsupportedMethod(String),
    NotAStruct {
        type_name: &'static str,
    },
    InvalidBody(String),
    /// A single input could not be converted to its field's type
    Field {
        field: String,
        value: String,
        expected: &'static str,
    },
    Decode(serde_json::Error),
    Meta(MetaError),
}

impl MaterializeError {
    pub(crate) fn invalid_field(field: &str, value: &Value, expected: &'static str) -> Self {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        MaterializeError::Field {
            field: field.to_string(),
            value,
            expected,
        }
    }

    /// The offending input name, when the failure is tied to one field.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            MaterializeError::Field { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl fmt::Display for MaterializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterializeError::UnsupportedMethod(method) => {
                write!(f, "HTTP method {method} is not supported")
            }
            MaterializeError::NotAStruct { type_name } => {
                write!(f, "{type_name} cannot be materialized: not a struct")
            }
            MaterializeError::InvalidBody(reason) => write!(f, "invalid JSON body: {reason}"),
            MaterializeError::Field {
                field,
                value,
                expected,
            } => write!(
                f,
                "invalid value `{value}` for field `{field}`: expected {expected}"
            ),
            MaterializeError::Decode(e) => write!(f, "request decode failed: {e}"),
            MaterializeError::Meta(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for MaterializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MaterializeError::Decode(e) => Some(e),
            MaterializeError::Meta(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests;
