use std::any::TypeId;

use tracing::warn;

use super::{Kind, TypeDescriptor};
use crate::meta::Tag;

/// Flattening stops here even if the type graph keeps going.
const MAX_FLATTEN_DEPTH: usize = 32;

/// Coarse classification of a field's type after `Option` is peeled off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Struct,
    Slice,
    Map,
    Pointer,
    Time,
}

/// One field as seen by consumers of a walked struct.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Declared Rust identifier
    pub name: &'static str,
    /// Name after serde renaming
    pub serde_name: &'static str,
    /// Lookup name: the `p` annotation if present, otherwise `serde_name`
    pub external_name: String,
    pub ty: &'static TypeDescriptor,
    pub tag: Tag,
    pub doc: Option<&'static str>,
    /// Reached through one or more `#[serde(flatten)]` fields
    pub embedded: bool,
    /// `Option<_>` field, or member of an optional flattened group
    pub optional: bool,
    /// Carries a `required` rule and is not optional
    pub required: bool,
    /// Identifies the flattened `Option<Struct>` this field came from.
    ///
    /// Members of one group are either all present or the group is `None`.
    pub optional_group: Option<usize>,
}

impl FieldInfo {
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        match &self.ty.kind {
            Kind::Struct(_) => FieldKind::Struct,
            Kind::Slice(_) => FieldKind::Slice,
            Kind::Map { .. } => FieldKind::Map,
            Kind::Pointer(_) => FieldKind::Pointer,
            Kind::Time(_) => FieldKind::Time,
            Kind::Scalar(_) | Kind::Any | Kind::Marker => FieldKind::Scalar,
        }
    }

    /// Descriptor with `Option` layers removed.
    #[must_use]
    pub fn target(&self) -> &'static TypeDescriptor {
        self.ty.deref()
    }

    /// Description from the `dc` (or `description`) key, falling back to doc comments.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.tag
            .get("dc")
            .or_else(|| self.tag.get("description"))
            .or(self.doc)
    }
}

/// Ordered, flattened field list of a struct descriptor.
///
/// The marker field is never included. Non-struct descriptors walk to an
/// empty list. The result is computed once per type and reused.
#[must_use]
pub fn fields(desc: &'static TypeDescriptor) -> &'static [FieldInfo] {
    let desc = desc.deref();
    match desc.struct_shape() {
        Some(shape) => shape
            .walked
            .get_or_init(|| {
                let mut out = Vec::with_capacity(shape.fields.len());
                let mut stack = vec![desc.id];
                let mut groups = 0usize;
                walk_into(desc, &mut out, &mut stack, &mut groups, Flatten::default());
                out
            })
            .as_slice(),
        None => &[],
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Flatten {
    embedded: bool,
    group: Option<usize>,
}

fn walk_into(
    desc: &'static TypeDescriptor,
    out: &mut Vec<FieldInfo>,
    stack: &mut Vec<TypeId>,
    groups: &mut usize,
    ctx: Flatten,
) {
    let Some(shape) = desc.struct_shape() else {
        return;
    };
    for def in &shape.fields {
        if def.marker {
            continue;
        }
        let ty = def.descriptor();
        if matches!(ty.kind, Kind::Marker) {
            continue;
        }

        if def.flatten {
            let target = ty.deref();
            if target.is_struct() {
                if stack.contains(&target.id) || stack.len() >= MAX_FLATTEN_DEPTH {
                    warn!(
                        type_name = desc.name,
                        field = def.name,
                        "Flattened field recursion stopped"
                    );
                    continue;
                }
                let group = match (ctx.group, ty.is_struct()) {
                    (Some(g), _) => Some(g),
                    (None, true) => None,
                    (None, false) => {
                        *groups += 1;
                        Some(*groups - 1)
                    }
                };
                stack.push(target.id);
                walk_into(
                    target,
                    out,
                    stack,
                    groups,
                    Flatten {
                        embedded: true,
                        group,
                    },
                );
                stack.pop();
                continue;
            }
        }

        let tag = Tag::lenient(def.tag);
        let external_name = tag.get("p").unwrap_or(def.serde_name).to_string();
        let optional = matches!(ty.kind, Kind::Pointer(_)) || ctx.group.is_some();
        let required = !optional && tag.is_required();
        out.push(FieldInfo {
            name: def.name,
            serde_name: def.serde_name,
            external_name,
            ty,
            tag,
            doc: def.doc,
            embedded: ctx.embedded,
            optional,
            required,
            optional_group: ctx.group,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{cached, Describe, FieldDef};
    use crate::meta::Meta;

    struct Base;
    impl Describe for Base {
        fn descriptor() -> &'static TypeDescriptor {
            cached::<Self>(|| {
                TypeDescriptor::structure::<Self>(
                    "Base",
                    vec![FieldDef::new("page", "page", <u32 as Describe>::descriptor)],
                )
            })
        }
    }

    struct Extra;
    impl Describe for Extra {
        fn descriptor() -> &'static TypeDescriptor {
            cached::<Self>(|| {
                TypeDescriptor::structure::<Self>(
                    "Extra",
                    vec![FieldDef::new("note", "note", <String as Describe>::descriptor)],
                )
            })
        }
    }

    struct Req;
    impl Describe for Req {
        fn descriptor() -> &'static TypeDescriptor {
            cached::<Self>(|| {
                TypeDescriptor::structure::<Self>(
                    "Req",
                    vec![
                        FieldDef::new("meta", "meta", <Meta as Describe>::descriptor)
                            .with_tag(r#"path:"/x" method:"GET""#)
                            .marker(),
                        FieldDef::new("name", "userName", <String as Describe>::descriptor)
                            .with_tag(r#"p:"n" v:"required" dc:"user name""#),
                        FieldDef::new("age", "age", <Option<i32> as Describe>::descriptor)
                            .with_tag(r#"v:"required""#),
                        FieldDef::new("base", "base", <Base as Describe>::descriptor).flattened(),
                        FieldDef::new("extra", "extra", <Option<Extra> as Describe>::descriptor)
                            .flattened(),
                        FieldDef::new("labels", "labels", <Vec<String> as Describe>::descriptor),
                    ],
                )
            })
        }
    }

    #[test]
    fn test_walk_skips_marker_and_flattens() {
        let walked = fields(Req::descriptor());
        let names: Vec<_> = walked.iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["name", "age", "page", "note", "labels"]);
    }

    #[test]
    fn test_external_name_precedence() {
        let walked = fields(Req::descriptor());
        assert_eq!(walked[0].serde_name, "userName");
        assert_eq!(walked[0].external_name, "n");
        assert_eq!(walked[2].external_name, "page");
        assert_eq!(walked[0].description(), Some("user name"));
    }

    #[test]
    fn test_required_and_optional() {
        let walked = fields(Req::descriptor());
        assert!(walked[0].required);
        // Option fields are never required even with a rule.
        assert!(walked[1].optional);
        assert!(!walked[1].required);
        assert_eq!(walked[1].kind(), FieldKind::Pointer);
        assert_eq!(walked[4].kind(), FieldKind::Slice);
    }

    #[test]
    fn test_embedded_groups() {
        let walked = fields(Req::descriptor());
        let page = &walked[2];
        assert!(page.embedded);
        assert_eq!(page.optional_group, None);
        let note = &walked[3];
        assert!(note.embedded && note.optional);
        assert_eq!(note.optional_group, Some(0));
    }

    #[test]
    fn test_non_struct_walks_empty() {
        assert!(fields(<Vec<u8> as Describe>::descriptor()).is_empty());
    }

    #[test]
    fn test_walk_is_memoized() {
        let a = fields(Req::descriptor());
        let b = fields(Req::descriptor());
        assert!(std::ptr::eq(a.as_ptr(), b.as_ptr()));
    }
}
