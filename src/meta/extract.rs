use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tag::{Tag, TagError};
use crate::descriptor::{Describe, TypeDescriptor};

/// Keys on the marker annotation that map onto [`Meta`] fields.
const RESERVED_MARKER_KEYS: [&str; 4] = ["path", "method", "summary", "tags"];
/// Keys on ordinary field annotations that never reach `Meta::extra`.
const RESERVED_FIELD_KEYS: [&str; 2] = ["json", "v"];

/// Route metadata carried by every request type.
///
/// Declared as a field annotated `#[meta(path:"/x" method:"GET" ...)]`. The
/// materializer fills it from the annotation before a handler sees the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Meta {
    pub path: String,
    /// Upper-cased HTTP method
    pub method: String,
    pub summary: String,
    /// Operation description, from `description` or `dc` on the marker only
    pub description: String,
    /// Comma-separated categories
    pub tags: String,
    pub extra: BTreeMap<String, String>,
}

impl Meta {
    /// `tags` split on commas, trimmed, empties dropped.
    #[must_use]
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }

    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }
}

/// Capability of request types that carry a [`Meta`] marker field.
///
/// Implemented by `#[derive(Describe)]` for structs with a `#[meta(...)]` field.
pub trait ApiRequest: Describe {
    fn meta(&self) -> &Meta;
    fn meta_mut(&mut self) -> &mut Meta;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaError {
    NotAStruct {
        type_name: &'static str,
    },
    MissingMarker {
        type_name: &'static str,
    },
    MultipleMarkers {
        type_name: &'static str,
    },
    MalformedTag {
        type_name: &'static str,
        field: &'static str,
        source: TagError,
    },
    MissingKey {
        type_name: &'static str,
        key: &'static str,
    },
}

impl fmt::Display for MetaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaError::NotAStruct { type_name } => {
                write!(f, "{type_name} is not a struct and cannot carry route metadata")
            }
            MetaError::MissingMarker { type_name } => {
                write!(f, "{type_name} has no #[meta(...)] marker field")
            }
            MetaError::MultipleMarkers { type_name } => {
                write!(f, "{type_name} declares more than one #[meta(...)] marker field")
            }
            MetaError::MalformedTag {
                type_name,
                field,
                source,
            } => write!(f, "{type_name}.{field}: {source}"),
            MetaError::MissingKey { type_name, key } => {
                write!(f, "{type_name} marker annotation is missing required key `{key}`")
            }
        }
    }
}

impl std::error::Error for MetaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MetaError::MalformedTag { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Route metadata declared on a request type.
///
/// Parsed once per type; later calls return the cached result, including a
/// cached failure.
pub fn meta_for(desc: &'static TypeDescriptor) -> Result<&'static Meta, MetaError> {
    let desc = desc.deref();
    let Some(shape) = desc.struct_shape() else {
        return Err(MetaError::NotAStruct {
            type_name: desc.name,
        });
    };
    shape
        .meta
        .get_or_init(|| extract(desc))
        .as_ref()
        .map_err(Clone::clone)
}

/// Whether the type declares a marker field at all.
#[must_use]
pub fn has_marker(desc: &'static TypeDescriptor) -> bool {
    desc.deref().marker_field().is_some()
}

/// Overwrite the request's marker field with its type's route metadata.
///
/// Idempotent: every call writes the same value for a given type.
pub fn init_meta<R: ApiRequest>(request: &mut R) -> Result<(), MetaError> {
    let meta = meta_for(R::descriptor())?;
    *request.meta_mut() = meta.clone();
    Ok(())
}

fn extract(desc: &'static TypeDescriptor) -> Result<Meta, MetaError> {
    let type_name = desc.name;
    let Some(shape) = desc.struct_shape() else {
        return Err(MetaError::NotAStruct { type_name });
    };

    let mut markers = shape.fields.iter().filter(|f| f.marker);
    let marker = markers
        .next()
        .ok_or(MetaError::MissingMarker { type_name })?;
    if markers.next().is_some() {
        return Err(MetaError::MultipleMarkers { type_name });
    }

    let parse = |field: &'static str, raw: &str| {
        Tag::parse(raw).map_err(|source| MetaError::MalformedTag {
            type_name,
            field,
            source,
        })
    };
    let marker_tag = parse(marker.name, marker.tag)?;

    let mut meta = Meta::default();
    for key in ["path", "method"] {
        match marker_tag.get(key) {
            Some(v) if !v.trim().is_empty() => {}
            _ => return Err(MetaError::MissingKey { type_name, key }),
        }
    }
    meta.path = marker_tag.get("path").unwrap_or_default().trim().to_string();
    meta.method = marker_tag
        .get("method")
        .unwrap_or_default()
        .trim()
        .to_ascii_uppercase();
    meta.summary = marker_tag.get("summary").unwrap_or_default().to_string();
    meta.tags = marker_tag.get("tags").unwrap_or_default().to_string();
    meta.description = marker_tag
        .get("description")
        .or_else(|| marker_tag.get("dc"))
        .unwrap_or_default()
        .to_string();

    for sibling in shape.fields.iter().filter(|f| !f.marker && !f.tag.is_empty()) {
        let tag = parse(sibling.name, sibling.tag)?;
        for (key, value) in tag.iter() {
            if !RESERVED_FIELD_KEYS.contains(&key) {
                meta.extra.insert(key.to_string(), value.to_string());
            }
        }
    }
    for (key, value) in marker_tag.iter() {
        if !RESERVED_MARKER_KEYS.contains(&key) {
            meta.extra.insert(key.to_string(), value.to_string());
        }
    }

    debug!(
        type_name,
        path = %meta.path,
        method = %meta.method,
        extra = meta.extra.len(),
        "Route metadata extracted"
    );
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{cached, FieldDef};

    macro_rules! request_type {
        ($name:ident, [$($field:expr),* $(,)?]) => {
            struct $name;
            impl Describe for $name {
                fn descriptor() -> &'static TypeDescriptor {
                    cached::<Self>(|| TypeDescriptor::structure::<Self>(stringify!($name), vec![$($field),*]))
                }
            }
        };
    }

    request_type!(Listed, [
        FieldDef::new("meta", "meta", <Meta as Describe>::descriptor)
            .with_tag(r#"path:"/users" method:"get" summary:"List" tags:"user, admin" x-cache:"60""#)
            .marker(),
        FieldDef::new("name", "name", <String as Describe>::descriptor)
            .with_tag(r#"v:"required" json:"name" dc:"user name""#),
    ]);

    request_type!(NoMarker, [
        FieldDef::new("name", "name", <String as Describe>::descriptor),
    ]);

    request_type!(NoMethod, [
        FieldDef::new("meta", "meta", <Meta as Describe>::descriptor)
            .with_tag(r#"path:"/x""#)
            .marker(),
    ]);

    request_type!(Broken, [
        FieldDef::new("meta", "meta", <Meta as Describe>::descriptor)
            .with_tag(r#"path:"/x" method:"GET"#)
            .marker(),
    ]);

    request_type!(Twice, [
        FieldDef::new("a", "a", <Meta as Describe>::descriptor).with_tag(r#"path:"/a" method:"GET""#).marker(),
        FieldDef::new("b", "b", <Meta as Describe>::descriptor).with_tag(r#"path:"/b" method:"GET""#).marker(),
    ]);

    #[test]
    fn test_extracts_reserved_and_extra_keys() {
        let meta = meta_for(Listed::descriptor()).unwrap();
        assert_eq!(meta.path, "/users");
        assert_eq!(meta.method, "GET");
        assert_eq!(meta.summary, "List");
        assert_eq!(meta.tag_list(), vec!["user", "admin"]);
        assert_eq!(meta.extra("x-cache"), Some("60"));
        // Sibling keys are harvested, except json and v.
        assert_eq!(meta.extra("dc"), Some("user name"));
        assert_eq!(meta.extra("v"), None);
        assert_eq!(meta.extra("json"), None);
        assert!(meta.description.is_empty());
    }

    request_type!(Described, [
        FieldDef::new("meta", "meta", <Meta as Describe>::descriptor)
            .with_tag(r#"path:"/search" method:"GET" dc:"Full-text search""#)
            .marker(),
        FieldDef::new("q", "q", <String as Describe>::descriptor)
            .with_tag(r#"description:"free text""#),
    ]);

    #[test]
    fn test_description_comes_from_marker() {
        let meta = meta_for(Described::descriptor()).unwrap();
        assert_eq!(meta.description, "Full-text search");
        assert_eq!(meta.extra("description"), Some("free text"));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            meta_for(NoMarker::descriptor()),
            Err(MetaError::MissingMarker { .. })
        ));
        assert!(matches!(
            meta_for(NoMethod::descriptor()),
            Err(MetaError::MissingKey { key: "method", .. })
        ));
        assert!(matches!(
            meta_for(Broken::descriptor()),
            Err(MetaError::MalformedTag { field: "meta", .. })
        ));
        assert!(matches!(
            meta_for(Twice::descriptor()),
            Err(MetaError::MultipleMarkers { .. })
        ));
        assert!(matches!(
            meta_for(<u8 as Describe>::descriptor()),
            Err(MetaError::NotAStruct { .. })
        ));
    }

    #[test]
    fn test_has_marker() {
        assert!(has_marker(Listed::descriptor()));
        assert!(!has_marker(NoMarker::descriptor()));
    }

    #[test]
    fn test_meta_for_is_stable() {
        let a = meta_for(Listed::descriptor()).unwrap();
        let b = meta_for(Listed::descriptor()).unwrap();
        assert!(std::ptr::eq(a, b));
    }
}
