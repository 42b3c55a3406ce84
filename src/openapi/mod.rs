//! # API Description
//!
//! Derives an OpenAPI-compatible document from the registered operations.
//!
//! - [`parameters_for`] lists the query and path inputs of a request type,
//!   using the same flat names the materializer reads
//! - [`schema_for`] describes a response type as nested objects, arrays,
//!   maps and primitives
//! - [`generate`] assembles paths, operations, request bodies and the
//!   envelope-wrapped `200` response for a whole [`Router`](crate::router::Router)
//!
//! Recursion is bounded: past [`MAX_DEPTH`] levels, or on reaching a type
//! that is already being expanded, a placeholder leaf is emitted instead.
//! Time types are plain `string` leaves with a `date-time` or `date` format.

mod document;
mod schema;

pub use document::{
    envelope_schema, generate, ApiDocument, Info, MediaType, Operation, PathItem, RequestBody,
    Response, OPENAPI_VERSION,
};
pub use schema::{
    parameters_for, schema_for, Parameter, ParameterLocation, ParameterSchema, Placeholder,
    Schema, SchemaType, MAX_DEPTH,
};
