use std::collections::BTreeMap;

use http::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::schema::{schema_for, Parameter, ParameterLocation, Schema, SchemaType};
use crate::router::{ApiDefinition, Router};

pub const OPENAPI_VERSION: &str = "3.0.3";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub title: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for Info {
    fn default() -> Self {
        Self {
            title: "metaroute API".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaType {
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    pub required: bool,
    pub content: BTreeMap<String, MediaType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub description: String,
    pub content: BTreeMap<String, MediaType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    pub responses: BTreeMap<String, Response>,
}

/// Operations of one path, keyed by lowercase method.
pub type PathItem = BTreeMap<String, Operation>;

/// OpenAPI-compatible description of every registered operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDocument {
    pub openapi: String,
    pub info: Info,
    pub paths: BTreeMap<String, PathItem>,
}

impl ApiDocument {
    #[must_use]
    pub fn operation(&self, path: &str, method: &Method) -> Option<&Operation> {
        self.paths
            .get(path)
            .and_then(|item| item.get(&method.as_str().to_ascii_lowercase()))
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Build the document for `router`.
///
/// Pure and repeatable: the same registrations always produce the same
/// document, and every call walks the types with fresh state.
#[must_use]
pub fn generate(router: &Router, info: Info) -> ApiDocument {
    let mut paths: BTreeMap<String, PathItem> = BTreeMap::new();
    for definition in router.definitions() {
        paths
            .entry(definition.path.clone())
            .or_default()
            .insert(
                definition.method.as_str().to_ascii_lowercase(),
                operation(definition),
            );
    }
    info!(
        title = %info.title,
        paths = paths.len(),
        operations = router.len(),
        "API document generated"
    );
    ApiDocument {
        openapi: OPENAPI_VERSION.to_string(),
        info,
        paths,
    }
}

fn operation(definition: &ApiDefinition) -> Operation {
    let meta = &definition.meta;
    let has_body = matches!(
        definition.method,
        Method::POST | Method::PUT | Method::PATCH
    );

    let parameters = if has_body {
        definition
            .parameters
            .iter()
            .filter(|p| p.location == ParameterLocation::Path)
            .cloned()
            .collect()
    } else {
        definition.parameters.clone()
    };
    let request_body = has_body.then(|| RequestBody {
        required: true,
        content: json_content(schema_for(definition.request)),
    });

    let mut responses = BTreeMap::new();
    responses.insert(
        "200".to_string(),
        Response {
            description: "Success".to_string(),
            content: json_content(envelope_schema(definition.response_schema.clone())),
        },
    );

    Operation {
        operation_id: definition.handler_name.clone(),
        summary: (!meta.summary.is_empty()).then(|| meta.summary.clone()),
        description: (!meta.description.is_empty()).then(|| meta.description.clone()),
        tags: meta.tag_list().into_iter().map(str::to_string).collect(),
        parameters,
        request_body,
        responses,
    }
}

fn json_content(schema: Schema) -> BTreeMap<String, MediaType> {
    let mut content = BTreeMap::new();
    content.insert("application/json".to_string(), MediaType { schema });
    content
}

/// `{code, message, data}` around the handler's response schema.
#[must_use]
pub fn envelope_schema(data: Schema) -> Schema {
    let mut properties = BTreeMap::new();
    properties.insert(
        "code".to_string(),
        Schema::of(SchemaType::Integer).with_format("int32"),
    );
    properties.insert("message".to_string(), Schema::of(SchemaType::String));
    properties.insert("data".to_string(), data);
    Schema {
        properties: Some(properties),
        required: Some(vec![
            "code".to_string(),
            "message".to_string(),
            "data".to_string(),
        ]),
        ..Schema::of(SchemaType::Object)
    }
}
