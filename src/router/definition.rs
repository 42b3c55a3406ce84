use std::fmt;

use http::Method;

use super::controller::Invoker;
use crate::descriptor::TypeDescriptor;
use crate::meta::{Meta, MetaError};
use crate::openapi::{Parameter, Schema};

/// One registered API operation.
///
/// Built by [`super::RouterBuilder`] when a controller is registered and never
/// modified afterwards.
pub struct ApiDefinition {
    /// `Controller.Operation`
    pub handler_name: String,
    pub controller: String,
    pub operation: String,
    /// Full path pattern: registration prefix joined with the annotated path
    pub path: String,
    pub method: Method,
    pub meta: Meta,
    pub request: &'static TypeDescriptor,
    pub response: &'static TypeDescriptor,
    /// Query and path parameters derived from the request type
    pub parameters: Vec<Parameter>,
    pub response_schema: Schema,
    /// `{name}` segments of `path`, in order
    pub path_vars: Vec<String>,
    pub(crate) invoker: Invoker,
}

impl fmt::Debug for ApiDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiDefinition")
            .field("handler_name", &self.handler_name)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("request", &self.request.name)
            .field("response", &self.response.name)
            .field("parameters", &self.parameters.len())
            .finish_non_exhaustive()
    }
}

/// Errors raised while registering controllers.
///
/// All of them are fatal at startup.
#[derive(Debug)]
pub enum RegistrationError {
    MissingPrefix {
        controller: String,
    },
    Meta {
        handler: String,
        source: MetaError,
    },
    UnsupportedMethod {
        handler: String,
        method: String,
    },
    DuplicateHandler {
        handler: String,
    },
    DuplicateRoute {
        method: Method,
        path: String,
        existing: String,
        handler: String,
    },
    InvalidPath {
        path: String,
        reason: String,
    },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::MissingPrefix { controller } => {
                write!(f, "controller {controller} registered without a path prefix")
            }
            RegistrationError::Meta { handler, source } => {
                write!(f, "invalid route metadata for {handler}: {source}")
            }
            RegistrationError::UnsupportedMethod { handler, method } => {
                write!(f, "{handler} declares unsupported HTTP method `{method}`")
            }
            RegistrationError::DuplicateHandler { handler } => {
                write!(f, "handler {handler} is registered twice")
            }
            RegistrationError::DuplicateRoute {
                method,
                path,
                existing,
                handler,
            } => write!(
                f,
                "{method} {path} of {handler} is already served by {existing}"
            ),
            RegistrationError::InvalidPath { path, reason } => {
                write!(f, "invalid path pattern `{path}`: {reason}")
            }
        }
    }
}

impl std::error::Error for RegistrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistrationError::Meta { source, .. } => Some(source),
            _ => None,
        }
    }
}
