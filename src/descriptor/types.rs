use std::any::TypeId;
use std::fmt;

use once_cell::sync::OnceCell;

use super::walk::FieldInfo;
use crate::meta::{Meta, MetaError};

/// Lazily resolved reference to another type's descriptor.
///
/// Descriptors only hold function pointers to their children, so recursive type
/// graphs (`User { friends: Vec<User> }`) describe without recursing at build time.
pub type TypeRef = fn() -> &'static TypeDescriptor;

/// Scalar kinds with enough width information for schema formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    /// Signed integer of the given bit width
    Int(u8),
    /// Unsigned integer of the given bit width
    Uint(u8),
    /// Floating point of the given bit width
    Float(u8),
    String,
    Char,
}

/// Textual time representations understood by the materializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeKind {
    /// RFC3339 timestamp with offset (`chrono::DateTime<Tz>`)
    DateTime,
    /// Timestamp without offset (`chrono::NaiveDateTime`)
    NaiveDateTime,
    /// Calendar date (`chrono::NaiveDate`)
    Date,
}

/// Shape of a described type.
#[derive(Debug)]
pub enum Kind {
    Scalar(ScalarKind),
    Time(TimeKind),
    /// Free-form JSON; rendered as a string wherever a concrete kind is needed
    Any,
    /// The route metadata marker type
    Marker,
    Struct(StructShape),
    Slice(TypeRef),
    Map { key: TypeRef, value: TypeRef },
    /// Optional indirection (`Option<T>`); allocated on first write
    Pointer(TypeRef),
}

/// Field list of a struct descriptor plus memoized derived views.
pub struct StructShape {
    pub fields: Vec<FieldDef>,
    pub(crate) walked: OnceCell<Vec<FieldInfo>>,
    pub(crate) meta: OnceCell<Result<Meta, MetaError>>,
}

impl fmt::Debug for StructShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructShape")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// One declared field, as emitted by `#[derive(Describe)]`.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Declared Rust identifier
    pub name: &'static str,
    /// Name on the wire after serde renaming
    pub serde_name: &'static str,
    pub ty: TypeRef,
    /// Raw `key:"value"` annotation block
    pub tag: &'static str,
    pub doc: Option<&'static str>,
    /// `#[serde(flatten)]`
    pub flatten: bool,
    /// The `#[meta(...)]` marker field
    pub marker: bool,
}

impl FieldDef {
    #[must_use]
    pub fn new(name: &'static str, serde_name: &'static str, ty: TypeRef) -> Self {
        Self {
            name,
            serde_name,
            ty,
            tag: "",
            doc: None,
            flatten: false,
            marker: false,
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: &'static str) -> Self {
        self.tag = tag;
        self
    }

    #[must_use]
    pub fn with_doc(mut self, doc: &'static str) -> Self {
        self.doc = Some(doc);
        self
    }

    #[must_use]
    pub fn flattened(mut self) -> Self {
        self.flatten = true;
        self
    }

    #[must_use]
    pub fn marker(mut self) -> Self {
        self.marker = true;
        self
    }

    /// Resolve the field's type descriptor.
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &'static TypeDescriptor {
        (self.ty)()
    }
}

/// Static description of one Rust type.
#[derive(Debug)]
pub struct TypeDescriptor {
    pub id: TypeId,
    pub name: &'static str,
    pub kind: Kind,
    pub doc: Option<&'static str>,
    /// Allowed string values for fieldless enums
    pub enum_values: Vec<&'static str>,
}

impl TypeDescriptor {
    #[must_use]
    pub fn new<T: ?Sized + 'static>(name: &'static str, kind: Kind) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name,
            kind,
            doc: None,
            enum_values: Vec::new(),
        }
    }

    #[must_use]
    pub fn structure<T: ?Sized + 'static>(name: &'static str, fields: Vec<FieldDef>) -> Self {
        Self::new::<T>(
            name,
            Kind::Struct(StructShape {
                fields,
                walked: OnceCell::new(),
                meta: OnceCell::new(),
            }),
        )
    }

    /// A fieldless enum serialized as one of `values`.
    #[must_use]
    pub fn enumeration<T: ?Sized + 'static>(name: &'static str, values: Vec<&'static str>) -> Self {
        let mut desc = Self::new::<T>(name, Kind::Scalar(ScalarKind::String));
        desc.enum_values = values;
        desc
    }

    #[must_use]
    pub fn with_doc(mut self, doc: &'static str) -> Self {
        self.doc = Some(doc);
        self
    }

    #[must_use]
    pub fn is_struct(&self) -> bool {
        matches!(self.kind, Kind::Struct(_))
    }

    #[must_use]
    pub fn struct_shape(&self) -> Option<&StructShape> {
        match &self.kind {
            Kind::Struct(shape) => Some(shape),
            _ => None,
        }
    }

    /// Follow `Option` indirections down to the pointee.
    #[must_use]
    pub fn deref(&'static self) -> &'static TypeDescriptor {
        let mut current = self;
        while let Kind::Pointer(inner) = current.kind {
            current = inner();
        }
        current
    }

    /// The declared `#[meta(...)]` field, if this is a request type.
    #[must_use]
    pub fn marker_field(&self) -> Option<&FieldDef> {
        self.struct_shape()
            .and_then(|s| s.fields.iter().find(|f| f.marker))
    }

    /// Short lowercase name of the kind, used in logs and error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            Kind::Scalar(ScalarKind::Bool) => "boolean",
            Kind::Scalar(ScalarKind::Int(_)) | Kind::Scalar(ScalarKind::Uint(_)) => "integer",
            Kind::Scalar(ScalarKind::Float(_)) => "number",
            Kind::Scalar(ScalarKind::String) if !self.enum_values.is_empty() => "enum",
            Kind::Scalar(ScalarKind::String) => "string",
            Kind::Scalar(ScalarKind::Char) => "character",
            Kind::Time(TimeKind::Date) => "date",
            Kind::Time(_) => "date-time",
            Kind::Any => "any",
            Kind::Marker => "meta",
            Kind::Struct(_) => "object",
            Kind::Slice(_) => "array",
            Kind::Map { .. } => "map",
            Kind::Pointer(_) => "optional",
        }
    }
}
