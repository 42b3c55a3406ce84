//! # Route Metadata
//!
//! Parsing of `key:"value"` annotation blocks and extraction of the per-route
//! [`Meta`] from a request type's marker field.
//!
//! ```text
//! #[meta(path:"/users" method:"GET" summary:"List users" tags:"user" x-cache:"60")]
//! ```
//!
//! `path`, `method`, `summary` and `tags` fill the corresponding `Meta`
//! fields, as does `description` (alias `dc`), read from the marker alone.
//! Every other marker key lands in `Meta::extra`. Keys found on
//! sibling field annotations are harvested into `extra` as well, except
//! `json` and `v`. A missing `path` or `method` is a [`MetaError`] raised
//! when the controller is registered.

mod extract;
mod tag;

pub use extract::{has_marker, init_meta, meta_for, ApiRequest, Meta, MetaError};
pub use tag::{Rule, Tag, TagError};
