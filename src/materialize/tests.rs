use std::collections::HashMap;

use chrono::{DateTime, Utc};
use http::Method;
use serde::Deserialize;

use super::*;
use crate::meta::Meta;
use crate::Describe;

#[derive(Debug, Clone, PartialEq, Describe, Deserialize)]
struct Address {
    city: String,
    zip: u32,
}

#[derive(Debug, Clone, PartialEq, Describe, Deserialize)]
struct Paging {
    page: u32,
    size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Describe, Deserialize)]
struct Filter {
    #[tag(p:"q")]
    query: String,
    #[serde(rename = "minAge")]
    min_age: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Describe, Deserialize)]
struct SearchReq {
    #[meta(path:"/search" method:"GET")]
    meta: Meta,
    name: String,
    age: i32,
    active: bool,
    ids: Vec<u32>,
    labels: HashMap<String, String>,
    #[serde(flatten)]
    paging: Paging,
    address: Address,
    filter: Option<Filter>,
    since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Describe, Deserialize)]
struct CreateReq {
    #[meta(path:"/users/{id}" method:"POST")]
    meta: Meta,
    id: u64,
    name: String,
    age: i32,
    #[tag(p:"nick")]
    #[serde(rename = "nickName")]
    nick_name: String,
    address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Describe, Deserialize)]
struct Geo {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Clone, PartialEq, Describe, Deserialize)]
struct PlaceReq {
    #[meta(path:"/places" method:"GET")]
    meta: Meta,
    name: String,
    #[serde(flatten)]
    geo: Option<Geo>,
}

fn get<R: crate::meta::ApiRequest + serde::de::DeserializeOwned>(query: &str) -> Result<R, MaterializeError> {
    materialize::<R>(&Method::GET, &RequestInput::new().with_query(query)).map(|m| m.request)
}

fn post<R: crate::meta::ApiRequest + serde::de::DeserializeOwned>(body: &str) -> Result<R, MaterializeError> {
    materialize::<R>(&Method::POST, &RequestInput::new().with_body(body)).map(|m| m.request)
}

#[test]
fn test_get_populates_every_kind_from_query() {
    let req: SearchReq = get(
        "name=Ann&age=30&active=true&ids=1&ids[]=2&labels[foo]=bar&labels[baz]=qux\
         &page=3&city=Paris&zip=75001&q=rust&minAge=18&since=2024-01-01T00:00:00Z",
    )
    .unwrap();

    assert_eq!(req.name, "Ann");
    assert_eq!(req.age, 30);
    assert!(req.active);
    assert_eq!(req.ids, vec![1, 2]);
    assert_eq!(req.labels.get("foo").map(String::as_str), Some("bar"));
    assert_eq!(req.labels.get("baz").map(String::as_str), Some("qux"));
    assert_eq!(req.paging, Paging { page: 3, size: None });
    assert_eq!(
        req.address,
        Address {
            city: "Paris".to_string(),
            zip: 75001
        }
    );
    assert_eq!(
        req.filter,
        Some(Filter {
            query: "rust".to_string(),
            min_age: Some(18)
        })
    );
    assert_eq!(
        req.since.map(|t| t.to_rfc3339()),
        Some("2024-01-01T00:00:00+00:00".to_string())
    );
}

#[test]
fn test_get_leaves_untouched_fields_at_zero() {
    let req: SearchReq = get("name=Ann").unwrap();
    assert_eq!(req.age, 0);
    assert!(!req.active);
    assert!(req.ids.is_empty());
    assert!(req.labels.is_empty());
    assert_eq!(req.address.city, "");
    assert_eq!(req.filter, None);
    assert_eq!(req.since, None);
}

#[test]
fn test_get_is_deterministic() {
    let query = "name=Ann&ids=3&ids=1&labels[a]=b&city=Rome";
    let first: SearchReq = get(query).unwrap();
    let second: SearchReq = get(query).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_get_rejects_bad_integer_with_field_name() {
    let err = get::<SearchReq>("name=Ann&age=abc").unwrap_err();
    assert_eq!(err.field(), Some("age"));
    assert!(err.to_string().contains("age"));
}

#[test]
fn test_empty_numeric_values_are_zero() {
    let req: SearchReq = get("name=Ann&age=&page=%20&zip=").unwrap();
    assert_eq!(req.age, 0);
    assert_eq!(req.paging.page, 0);
    assert_eq!(req.address.zip, 0);

    let req: PlaceReq = get("name=a&lat=&lng=2.5").unwrap();
    assert_eq!(req.geo, Some(Geo { lat: 0.0, lng: 2.5 }));

    let req: CreateReq = post(r#"{"age":""}"#).unwrap();
    assert_eq!(req.age, 0);
}

#[test]
fn test_meta_is_initialized() {
    let req: SearchReq = get("").unwrap();
    assert_eq!(req.meta.path, "/search");
    assert_eq!(req.meta.method, "GET");
}

#[test]
fn test_post_partial_body_keeps_zero_values() {
    let req: CreateReq = post(r#"{"name":"Bob"}"#).unwrap();
    assert_eq!(req.name, "Bob");
    assert_eq!(req.age, 0);
    assert_eq!(req.address, None);
    assert_eq!(req.meta.method, "POST");
}

#[test]
fn test_post_empty_body_is_empty_object() {
    let req: CreateReq = post("  ").unwrap();
    assert_eq!(req.name, "");
}

#[test]
fn test_post_lookup_name_then_serde_name() {
    let req: CreateReq = post(r#"{"nick":"b","address":{"city":"Oslo"}}"#).unwrap();
    assert_eq!(req.nick_name, "b");
    assert_eq!(
        req.address,
        Some(Address {
            city: "Oslo".to_string(),
            zip: 0
        })
    );

    let req: CreateReq = post(r#"{"nickName":"c"}"#).unwrap();
    assert_eq!(req.nick_name, "c");
}

#[test]
fn test_post_coerces_strings() {
    let req: CreateReq = post(r#"{"age":"41"}"#).unwrap();
    assert_eq!(req.age, 41);
}

#[test]
fn test_post_nested_error_is_qualified() {
    let err = post::<CreateReq>(r#"{"address":{"zip":"abc"}}"#).unwrap_err();
    assert_eq!(err.field(), Some("address.zip"));
}

#[test]
fn test_post_rejects_non_object_bodies() {
    assert!(matches!(
        post::<CreateReq>("[1,2]"),
        Err(MaterializeError::InvalidBody(_))
    ));
    assert!(matches!(
        post::<CreateReq>("{not json"),
        Err(MaterializeError::InvalidBody(_))
    ));
}

#[test]
fn test_delete_applies_body_over_query() {
    let input = RequestInput::new()
        .with_query("name=q&age=1")
        .with_body(r#"{"age":2}"#);
    let req = materialize::<CreateReq>(&Method::DELETE, &input).unwrap().request;
    assert_eq!(req.name, "q");
    assert_eq!(req.age, 2);

    let input = RequestInput::new().with_query("age=5");
    let req = materialize::<CreateReq>(&Method::DELETE, &input).unwrap().request;
    assert_eq!(req.age, 5);
}

#[test]
fn test_path_params_override_other_input() {
    let input = RequestInput::new()
        .with_body(r#"{"id":1,"name":"x"}"#)
        .with_path_param("id", "77");
    let req = materialize::<CreateReq>(&Method::POST, &input).unwrap().request;
    assert_eq!(req.id, 77);
    assert_eq!(req.name, "x");
}

#[test]
fn test_unsupported_method() {
    let err = materialize::<CreateReq>(&Method::HEAD, &RequestInput::new()).unwrap_err();
    assert!(matches!(err, MaterializeError::UnsupportedMethod(ref m) if m == "HEAD"));
}

#[test]
fn test_flattened_optional_group() {
    let req: PlaceReq = get("name=a").unwrap();
    assert_eq!(req.geo, None);

    let req: PlaceReq = get("name=a&lat=1.5").unwrap();
    assert_eq!(req.geo, Some(Geo { lat: 1.5, lng: 0.0 }));
}

#[test]
fn test_materialized_value_is_returned() {
    let input = RequestInput::new().with_query("name=Ann");
    let out = materialize::<SearchReq>(&Method::GET, &input).unwrap();
    assert_eq!(out.value["name"], "Ann");
    assert_eq!(out.value["age"], 0);
}
