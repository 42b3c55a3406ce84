use std::any::TypeId;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::{fields, Kind, ScalarKind, TimeKind, TypeDescriptor};

/// Nesting ceiling for schema recursion.
pub const MAX_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Leaf emitted where recursion was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placeholder {
    #[serde(rename = "max depth reached")]
    MaxDepth,
    #[serde(rename = "circular reference")]
    CircularReference,
}

impl Placeholder {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Placeholder::MaxDepth => "max depth reached",
            Placeholder::CircularReference => "circular reference",
        }
    }
}

/// Nested description of a request or response type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<Box<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(rename = "x-placeholder", skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<Placeholder>,
}

impl Schema {
    #[must_use]
    pub fn of(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    #[must_use]
    pub fn placeholder(kind: Placeholder) -> Self {
        Self {
            schema_type: Some(SchemaType::Object),
            description: Some(kind.as_str().to_string()),
            placeholder: Some(kind),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.placeholder.is_some()
    }

    /// Property `name` of an object schema.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Schema> {
        self.properties.as_ref().and_then(|p| p.get(name))
    }

    /// Depth-first search for the first placeholder of `kind`.
    #[must_use]
    pub fn contains_placeholder(&self, kind: Placeholder) -> bool {
        if self.placeholder == Some(kind) {
            return true;
        }
        self.properties
            .iter()
            .flat_map(BTreeMap::values)
            .chain(self.items.as_deref())
            .chain(self.additional_properties.as_deref())
            .any(|child| child.contains_placeholder(kind))
    }
}

/// Where a parameter is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Query,
    Path,
}

/// The simplified type and format of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParameterSchema>>,
}

/// One query or path input of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    pub schema: ParameterSchema,
}

/// Schema of a response (or request body) type.
///
/// Recursion stops at [`MAX_DEPTH`] and at types already on the active
/// path; both are replaced by placeholder leaves, so this always returns.
#[must_use]
pub fn schema_for(desc: &'static TypeDescriptor) -> Schema {
    let mut walker = SchemaWalker::default();
    walker.walk(desc, 0)
}

#[derive(Default)]
struct SchemaWalker {
    active: HashSet<TypeId>,
}

impl SchemaWalker {
    fn walk(&mut self, desc: &'static TypeDescriptor, depth: usize) -> Schema {
        if depth > MAX_DEPTH {
            debug!(type_name = desc.name, depth, "Schema depth limit reached");
            return Schema::placeholder(Placeholder::MaxDepth);
        }
        match &desc.kind {
            Kind::Scalar(scalar) => scalar_schema(*scalar, &desc.enum_values),
            Kind::Time(time) => time_schema(*time),
            Kind::Any => Schema::of(SchemaType::String),
            Kind::Marker => Schema::of(SchemaType::Object),
            Kind::Pointer(inner) => {
                let mut schema = self.walk(inner(), depth);
                if !schema.is_placeholder() {
                    schema.nullable = Some(true);
                }
                schema
            }
            Kind::Slice(elem) => Schema {
                items: Some(Box::new(self.walk(elem(), depth + 1))),
                ..Schema::of(SchemaType::Array)
            },
            Kind::Map { value, .. } => Schema {
                additional_properties: Some(Box::new(self.walk(value(), depth + 1))),
                ..Schema::of(SchemaType::Object)
            },
            Kind::Struct(_) => self.walk_struct(desc, depth),
        }
    }

    fn walk_struct(&mut self, desc: &'static TypeDescriptor, depth: usize) -> Schema {
        if !self.active.insert(desc.id) {
            debug!(type_name = desc.name, "Circular schema reference");
            return Schema::placeholder(Placeholder::CircularReference);
        }
        let mut properties = BTreeMap::new();
        let mut required = Vec::new();
        for field in fields(desc) {
            let mut schema = self.walk(field.ty, depth + 1);
            if schema.description.is_none() {
                schema.description = field.description().map(str::to_string);
            }
            if field.required {
                required.push(field.serde_name.to_string());
            }
            properties.insert(field.serde_name.to_string(), schema);
        }
        // Siblings may reach the same type independently.
        self.active.remove(&desc.id);

        Schema {
            description: desc.doc.map(str::to_string),
            properties: Some(properties),
            required: (!required.is_empty()).then_some(required),
            ..Schema::of(SchemaType::Object)
        }
    }
}

fn scalar_schema(scalar: ScalarKind, enum_values: &[&'static str]) -> Schema {
    match scalar {
        ScalarKind::Bool => Schema::of(SchemaType::Boolean),
        ScalarKind::Int(bits) | ScalarKind::Uint(bits) => {
            Schema::of(SchemaType::Integer).with_format(if bits > 32 { "int64" } else { "int32" })
        }
        ScalarKind::Float(bits) => {
            Schema::of(SchemaType::Number).with_format(if bits > 32 { "double" } else { "float" })
        }
        ScalarKind::String if !enum_values.is_empty() => Schema {
            enum_values: Some(enum_values.iter().map(|v| (*v).to_string()).collect()),
            ..Schema::of(SchemaType::String)
        },
        ScalarKind::String => Schema::of(SchemaType::String),
        ScalarKind::Char => Schema {
            format: Some("char".to_string()),
            ..Schema::of(SchemaType::String)
        },
    }
}

fn time_schema(time: TimeKind) -> Schema {
    match time {
        TimeKind::Date => Schema::of(SchemaType::String).with_format("date"),
        TimeKind::DateTime | TimeKind::NaiveDateTime => {
            Schema::of(SchemaType::String).with_format("date-time")
        }
    }
}

/// Query and path parameters of a request type.
///
/// Nested struct fields are listed under their own names, matching the flat
/// query namespace the materializer reads. Names in `path_vars` are marked
/// `in: path` and required; path variables without a matching field are
/// still listed, as strings.
#[must_use]
pub fn parameters_for(desc: &'static TypeDescriptor, path_vars: &[String]) -> Vec<Parameter> {
    let mut out = Vec::new();
    let mut active = HashSet::new();
    collect_parameters(desc.deref(), path_vars, &mut active, &mut out, 0);
    for var in path_vars {
        if !out.iter().any(|p| p.name == *var) {
            out.push(Parameter {
                name: var.clone(),
                location: ParameterLocation::Path,
                description: None,
                required: true,
                schema: ParameterSchema {
                    schema_type: SchemaType::String,
                    format: None,
                    items: None,
                },
            });
        }
    }
    out
}

fn collect_parameters(
    desc: &'static TypeDescriptor,
    path_vars: &[String],
    active: &mut HashSet<TypeId>,
    out: &mut Vec<Parameter>,
    depth: usize,
) {
    if depth > MAX_DEPTH || !active.insert(desc.id) {
        return;
    }
    for field in fields(desc) {
        let target = field.target();
        if target.is_struct() {
            collect_parameters(target, path_vars, active, out, depth + 1);
            continue;
        }
        if out.iter().any(|p| p.name == field.external_name) {
            continue;
        }
        let in_path = path_vars.contains(&field.external_name);
        out.push(Parameter {
            name: field.external_name.clone(),
            location: if in_path {
                ParameterLocation::Path
            } else {
                ParameterLocation::Query
            },
            description: field.description().map(str::to_string),
            required: in_path || field.required,
            schema: parameter_schema(target, 0),
        });
    }
    active.remove(&desc.id);
}

fn parameter_schema(desc: &'static TypeDescriptor, depth: usize) -> ParameterSchema {
    let flat = |schema_type: SchemaType, format: Option<&str>| ParameterSchema {
        schema_type,
        format: format.map(str::to_string),
        items: None,
    };
    match &desc.kind {
        Kind::Slice(elem) if depth < MAX_DEPTH => ParameterSchema {
            schema_type: SchemaType::Array,
            format: None,
            items: Some(Box::new(parameter_schema(elem().deref(), depth + 1))),
        },
        Kind::Slice(_) => flat(SchemaType::Array, None),
        Kind::Map { .. } | Kind::Struct(_) | Kind::Marker => flat(SchemaType::Object, None),
        Kind::Pointer(inner) => parameter_schema(inner(), depth),
        Kind::Scalar(scalar) => {
            let schema = scalar_schema(*scalar, &[]);
            flat(
                schema.schema_type.unwrap_or(SchemaType::String),
                schema.format.as_deref(),
            )
        }
        Kind::Time(time) => flat(SchemaType::String, time_schema(*time).format.as_deref()),
        Kind::Any => flat(SchemaType::String, None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::meta::Meta;
    use crate::Describe;

    #[derive(Serialize, Describe)]
    struct Node {
        name: String,
        children: Vec<Node>,
    }

    #[derive(Serialize, Describe)]
    struct Left {
        right: Option<Box<Right>>,
    }

    #[derive(Serialize, Describe)]
    struct Right {
        left: Left,
    }

    #[derive(Serialize, Deserialize, Describe)]
    struct Point {
        x: f64,
        y: f32,
    }

    #[derive(Serialize, Describe)]
    struct Shapes {
        first: Point,
        second: Point,
        at: DateTime<Utc>,
        scores: HashMap<String, i64>,
    }

    #[derive(Serialize, Describe)]
    struct Level10 {
        leaf: String,
    }
    #[derive(Serialize, Describe)]
    struct Level9 {
        next: Level10,
    }
    #[derive(Serialize, Describe)]
    struct Level8 {
        next: Level9,
    }
    #[derive(Serialize, Describe)]
    struct Level7 {
        next: Level8,
    }
    #[derive(Serialize, Describe)]
    struct Level6 {
        next: Level7,
    }
    #[derive(Serialize, Describe)]
    struct Level5 {
        next: Level6,
    }
    #[derive(Serialize, Describe)]
    struct Level4 {
        next: Level5,
    }
    #[derive(Serialize, Describe)]
    struct Level3 {
        next: Level4,
    }
    #[derive(Serialize, Describe)]
    struct Level2 {
        next: Level3,
    }
    #[derive(Serialize, Describe)]
    struct Level1 {
        next: Level2,
    }
    #[derive(Serialize, Describe)]
    struct Level0 {
        next: Level1,
    }

    #[derive(Deserialize, Describe)]
    struct GetUser {
        #[meta(path:"/users/{id}" method:"GET")]
        meta: Meta,
        id: u64,
        #[tag(p:"q" dc:"search text" v:"required")]
        query: String,
        tags: Vec<String>,
        page: Option<Point>,
    }

    #[test]
    fn test_self_reference_is_a_placeholder() {
        let schema = schema_for(Node::descriptor());
        let items = schema.property("children").and_then(|c| c.items.as_deref()).unwrap();
        assert_eq!(items.placeholder, Some(Placeholder::CircularReference));
        assert_eq!(schema.property("name").unwrap().schema_type, Some(SchemaType::String));
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let schema = schema_for(Left::descriptor());
        assert!(schema.contains_placeholder(Placeholder::CircularReference));
        let right = schema.property("right").unwrap();
        assert_eq!(right.nullable, Some(true));
    }

    #[test]
    fn test_sibling_branches_are_expanded() {
        let schema = schema_for(Shapes::descriptor());
        for name in ["first", "second"] {
            let point = schema.property(name).unwrap();
            assert!(!point.is_placeholder());
            assert_eq!(
                point.property("x").and_then(|x| x.format.as_deref()),
                Some("double")
            );
            assert_eq!(point.property("y").and_then(|y| y.format.as_deref()), Some("float"));
        }
        let at = schema.property("at").unwrap();
        assert_eq!(at.format.as_deref(), Some("date-time"));
        assert!(at.properties.is_none());
        let scores = schema.property("scores").unwrap();
        assert_eq!(
            scores.additional_properties.as_ref().and_then(|s| s.format.as_deref()),
            Some("int64")
        );
    }

    #[test]
    fn test_depth_ceiling() {
        let schema = schema_for(Level0::descriptor());
        assert!(schema.contains_placeholder(Placeholder::MaxDepth));
        let json = serde_json::to_value(&schema).unwrap();
        assert!(json.to_string().contains("max depth reached"));
    }

    #[test]
    fn test_schema_generation_is_deterministic() {
        let a = serde_json::to_string(&schema_for(Shapes::descriptor())).unwrap();
        let b = serde_json::to_string(&schema_for(Shapes::descriptor())).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parameters_for_request() {
        let params = parameters_for(GetUser::descriptor(), &["id".to_string()]);
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["id", "q", "tags", "x", "y"]);

        let id = &params[0];
        assert_eq!(id.location, ParameterLocation::Path);
        assert!(id.required);
        assert_eq!(id.schema.format.as_deref(), Some("int64"));

        let q = &params[1];
        assert_eq!(q.location, ParameterLocation::Query);
        assert_eq!(q.description.as_deref(), Some("search text"));
        assert!(q.required);

        let tags = &params[2];
        assert_eq!(tags.schema.schema_type, SchemaType::Array);
        assert!(!tags.required);
    }

    #[test]
    fn test_unbound_path_variable_is_listed() {
        let params = parameters_for(GetUser::descriptor(), &["org".to_string()]);
        let org = params.iter().find(|p| p.name == "org").unwrap();
        assert_eq!(org.location, ParameterLocation::Path);
        assert_eq!(org.schema.schema_type, SchemaType::String);
    }
}
