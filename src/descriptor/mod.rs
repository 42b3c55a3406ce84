//! # Type Descriptors
//!
//! Static, memoized descriptions of Rust types used by route discovery,
//! request materialization and schema generation.
//!
//! A type participates by implementing [`Describe`], normally through
//! `#[derive(Describe)]`. The descriptor records the type's kind (scalar,
//! struct, slice, map, optional, time) and, for structs, the declared fields
//! with their serde names and `key:"value"` annotations. Child types are held
//! as [`TypeRef`] function pointers, so self-referential graphs are fine.
//!
//! ## Walking
//!
//! [`fields`] turns a struct descriptor into the flattened list of
//! [`FieldInfo`] consumers actually work with:
//!
//! - the `#[meta(...)]` marker field is skipped
//! - `#[serde(flatten)]` fields are inlined into the parent
//! - a flattened `Option<Struct>` contributes optional fields
//! - the lookup name resolves as `p` annotation, then serde name
//!
//! ## Caching
//!
//! Descriptors are built once per `TypeId` and leaked into a process-wide
//! table; walked field lists are cached on the descriptor itself. Both are
//! safe to read from any number of coroutines.

mod cache;
mod primitives;
mod types;
mod walk;

pub use cache::{cached, cached_count};
pub use types::{FieldDef, Kind, ScalarKind, StructShape, TimeKind, TypeDescriptor, TypeRef};
pub use walk::{fields, FieldInfo, FieldKind};

/// A type with a static descriptor.
pub trait Describe {
    fn descriptor() -> &'static TypeDescriptor;
}

/// Shorthand for `T::descriptor()`.
#[inline]
#[must_use]
pub fn describe<T: Describe + ?Sized>() -> &'static TypeDescriptor {
    T::descriptor()
}
