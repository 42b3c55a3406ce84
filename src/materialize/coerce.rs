//! Kind-directed value coercion and zero values.

use std::any::TypeId;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use super::query::QueryValues;
use super::MaterializeError;
use crate::descriptor::{fields, Kind, ScalarKind, TimeKind, TypeDescriptor};

/// Nesting limit for zero values and coercion.
pub(crate) const MAX_DEPTH: usize = 32;

const NAIVE_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// The zero value of a described type, shaped for serde.
///
/// Time values are the Unix epoch, enums take their first variant, optional
/// values are `null`.
#[must_use]
pub fn zero_value(desc: &'static TypeDescriptor) -> Value {
    zero_at(desc, 0)
}

pub(crate) fn zero_at(desc: &'static TypeDescriptor, depth: usize) -> Value {
    match &desc.kind {
        Kind::Scalar(ScalarKind::Bool) => Value::Bool(false),
        Kind::Scalar(ScalarKind::Int(_)) | Kind::Scalar(ScalarKind::Uint(_)) => Value::from(0),
        Kind::Scalar(ScalarKind::Float(_)) => Value::from(0.0),
        Kind::Scalar(ScalarKind::String) => Value::String(
            desc.enum_values
                .first()
                .map(|v| (*v).to_string())
                .unwrap_or_default(),
        ),
        Kind::Scalar(ScalarKind::Char) => Value::String("\0".to_string()),
        Kind::Time(kind) => Value::String(epoch(*kind).to_string()),
        Kind::Any => Value::Null,
        Kind::Marker | Kind::Map { .. } => Value::Object(Map::new()),
        Kind::Struct(_) if depth >= MAX_DEPTH => Value::Object(Map::new()),
        Kind::Struct(_) => Value::Object(zero_object(desc, depth + 1)),
        Kind::Slice(_) => Value::Array(Vec::new()),
        Kind::Pointer(_) => Value::Null,
    }
}

/// Every visible field of a struct set to its zero value.
///
/// Members of optional flattened groups are left out until the group is touched.
pub(crate) fn zero_object(desc: &'static TypeDescriptor, depth: usize) -> Map<String, Value> {
    let mut map = Map::new();
    if let Some(marker) = desc.marker_field() {
        map.insert(marker.serde_name.to_string(), Value::Object(Map::new()));
    }
    for field in fields(desc) {
        if field.optional_group.is_none() {
            map.insert(field.serde_name.to_string(), zero_at(field.ty, depth));
        }
    }
    map
}

/// Zero-fill the missing members of the touched optional groups.
fn fill_groups(target: &mut Map<String, Value>, desc: &'static TypeDescriptor, groups: &[usize], depth: usize) {
    if groups.is_empty() {
        return;
    }
    for field in fields(desc) {
        if let Some(group) = field.optional_group {
            if groups.contains(&group) && !target.contains_key(field.serde_name) {
                target.insert(field.serde_name.to_string(), zero_at(field.ty, depth));
            }
        }
    }
}

fn epoch(kind: TimeKind) -> &'static str {
    match kind {
        TimeKind::DateTime => "1970-01-01T00:00:00Z",
        TimeKind::NaiveDateTime => "1970-01-01T00:00:00",
        TimeKind::Date => "1970-01-01",
    }
}

/// Convert `value` into the JSON shape `desc` deserializes from.
///
/// `field` names the input in errors (`address.zip`, `ids[2]`, `scores[math]`).
pub fn coerce(value: &Value, desc: &'static TypeDescriptor, field: &str) -> Result<Value, MaterializeError> {
    coerce_at(value, desc, field, 0)
}

fn coerce_at(
    value: &Value,
    desc: &'static TypeDescriptor,
    field: &str,
    depth: usize,
) -> Result<Value, MaterializeError> {
    let fail = |expected: &'static str| MaterializeError::invalid_field(field, value, expected);
    if depth > MAX_DEPTH {
        return Err(fail("a shallower value"));
    }
    match &desc.kind {
        Kind::Pointer(inner) => {
            if value.is_null() {
                Ok(Value::Null)
            } else {
                coerce_at(value, inner(), field, depth)
            }
        }
        Kind::Any => Ok(value.clone()),
        Kind::Marker => Ok(Value::Object(Map::new())),
        Kind::Scalar(kind) => coerce_scalar(value, *kind, desc, field),
        Kind::Time(kind) => coerce_time(value, *kind).ok_or_else(|| fail(desc.kind_name())),
        Kind::Struct(_) => match value {
            Value::Object(body) => {
                let mut target = zero_object(desc, depth + 1);
                apply_json(&mut target, desc, body, field, depth + 1)?;
                Ok(Value::Object(target))
            }
            Value::Null => Ok(zero_at(desc, depth)),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(parsed @ Value::Object(_)) => coerce_at(&parsed, desc, field, depth),
                _ => Err(fail("object")),
            },
            _ => Err(fail("object")),
        },
        Kind::Slice(elem) => match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| coerce_at(item, elem(), &format!("{field}[{i}]"), depth + 1))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Null => Ok(Value::Array(Vec::new())),
            Value::String(raw) if raw.trim_start().starts_with('[') => {
                match serde_json::from_str::<Value>(raw) {
                    Ok(parsed @ Value::Array(_)) => coerce_at(&parsed, desc, field, depth),
                    _ => Err(fail("array")),
                }
            }
            single => Ok(Value::Array(vec![coerce_at(
                single,
                elem(),
                &format!("{field}[0]"),
                depth + 1,
            )?])),
        },
        Kind::Map { key, value: item } => match value {
            Value::Object(entries) => {
                let mut out = Map::new();
                for (k, v) in entries {
                    let path = format!("{field}[{k}]");
                    coerce_at(&Value::String(k.clone()), key(), &path, depth + 1)?;
                    out.insert(k.clone(), coerce_at(v, item(), &path, depth + 1)?);
                }
                Ok(Value::Object(out))
            }
            Value::Null => Ok(Value::Object(Map::new())),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(parsed @ Value::Object(_)) => coerce_at(&parsed, desc, field, depth),
                _ => Err(fail("map")),
            },
            _ => Err(fail("map")),
        },
    }
}

fn coerce_scalar(
    value: &Value,
    kind: ScalarKind,
    desc: &'static TypeDescriptor,
    field: &str,
) -> Result<Value, MaterializeError> {
    let fail = || MaterializeError::invalid_field(field, value, desc.kind_name());
    match kind {
        ScalarKind::Bool => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Null => Ok(Value::Bool(false)),
            Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
            Value::String(s) => parse_bool(s).map(Value::Bool).ok_or_else(fail),
            _ => Err(fail()),
        },
        ScalarKind::Int(bits) => {
            let n = as_integer(value).ok_or_else(fail)?;
            let min = -(1i128 << (bits - 1));
            let max = (1i128 << (bits - 1)) - 1;
            if n < min || n > max {
                return Err(fail());
            }
            i64::try_from(n).map(Value::from).map_err(|_| fail())
        }
        ScalarKind::Uint(bits) => {
            let n = as_integer(value).ok_or_else(fail)?;
            let max = (1i128 << bits) - 1;
            if n < 0 || n > max {
                return Err(fail());
            }
            u64::try_from(n).map(Value::from).map_err(|_| fail())
        }
        ScalarKind::Float(_) => {
            let f = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) if s.trim().is_empty() => Some(0.0),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                Value::Null => Some(0.0),
                _ => None,
            };
            f.and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(fail)
        }
        ScalarKind::String => {
            let s = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => return Ok(zero_at(desc, 0)),
                _ => return Err(fail()),
            };
            if !desc.enum_values.is_empty() && !desc.enum_values.contains(&s.as_str()) {
                return Err(fail());
            }
            Ok(Value::String(s))
        }
        ScalarKind::Char => {
            let s = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return Err(fail()),
            };
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::String(c.to_string())),
                _ => Err(fail()),
            }
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "t" => Some(true),
        "false" | "0" | "no" | "off" | "f" | "" => Some(false),
        _ => None,
    }
}

fn as_integer(value: &Value) -> Option<i128> {
    fn from_float(f: f64) -> Option<i128> {
        (f.is_finite() && f.fract() == 0.0 && f.abs() < 1e38).then_some(f as i128)
    }
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| n.as_f64().and_then(from_float)),
        Value::String(s) if s.trim().is_empty() => Some(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i128>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(from_float))
        }
        Value::Bool(b) => Some(i128::from(*b)),
        Value::Null => Some(0),
        _ => None,
    }
}

fn coerce_time(value: &Value, kind: TimeKind) -> Option<Value> {
    let parsed = match value {
        Value::String(raw) => parse_time(raw.trim())?,
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.naive_utc())?,
        Value::Null => return Some(Value::String(epoch(kind).to_string())),
        _ => return None,
    };
    let text = match kind {
        // Offsets are kept when present; naive input is taken as UTC.
        TimeKind::DateTime => match value {
            Value::String(raw) if DateTime::parse_from_rfc3339(raw.trim()).is_ok() => {
                raw.trim().to_string()
            }
            _ => DateTime::<Utc>::from_naive_utc_and_offset(parsed, Utc)
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        },
        TimeKind::NaiveDateTime => parsed.format(NAIVE_DATETIME_FORMAT).to_string(),
        TimeKind::Date => parsed.date().format(DATE_FORMAT).to_string(),
    };
    Some(Value::String(text))
}

/// RFC3339, `YYYY-MM-DD[T ]HH:MM:SS[.f]` or a bare date, as naive UTC.
fn parse_time(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in [NAIVE_DATETIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Overlay a JSON object onto `target` field by field.
///
/// Keys are looked up by external name, then serde name. Absent fields keep
/// whatever `target` already holds.
pub(crate) fn apply_json(
    target: &mut Map<String, Value>,
    desc: &'static TypeDescriptor,
    body: &Map<String, Value>,
    prefix: &str,
    depth: usize,
) -> Result<(), MaterializeError> {
    let mut groups: Vec<usize> = Vec::new();
    for field in fields(desc) {
        let Some(raw) = body
            .get(&field.external_name)
            .or_else(|| body.get(field.serde_name))
        else {
            continue;
        };
        let path = qualify(prefix, &field.external_name);
        let value = coerce_at(raw, field.ty, &path, depth)?;
        target.insert(field.serde_name.to_string(), value);
        if let Some(group) = field.optional_group {
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
    }
    fill_groups(target, desc, &groups, depth);
    Ok(())
}

/// Overlay query values onto `target`.
///
/// Nested structs read from the same flat namespace. Returns whether any
/// field was written.
pub(crate) fn apply_query(
    target: &mut Map<String, Value>,
    desc: &'static TypeDescriptor,
    query: &QueryValues,
    stack: &mut Vec<TypeId>,
    depth: usize,
) -> Result<bool, MaterializeError> {
    let mut touched_any = false;
    let mut groups: Vec<usize> = Vec::new();
    for field in fields(desc) {
        let name = field.external_name.as_str();
        let inner = field.target();
        let touched = match &inner.kind {
            Kind::Struct(_) => {
                if stack.contains(&inner.id) || depth >= MAX_DEPTH {
                    false
                } else {
                    let mut nested = match target.get(field.serde_name) {
                        Some(Value::Object(existing)) => existing.clone(),
                        _ => zero_object(inner, depth + 1),
                    };
                    stack.push(inner.id);
                    let hit = apply_query(&mut nested, inner, query, stack, depth + 1);
                    stack.pop();
                    let hit = hit?;
                    if hit {
                        target.insert(field.serde_name.to_string(), Value::Object(nested));
                    }
                    hit
                }
            }
            Kind::Slice(elem) => {
                let values = query.all(name);
                if values.is_empty() {
                    false
                } else {
                    let items = values
                        .iter()
                        .enumerate()
                        .map(|(i, v)| {
                            coerce_at(&Value::String((*v).to_string()), elem(), &format!("{name}[{i}]"), depth)
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    target.insert(field.serde_name.to_string(), Value::Array(items));
                    true
                }
            }
            Kind::Map { key, value } => {
                let entries = query.map_entries(name);
                if entries.is_empty() {
                    false
                } else {
                    let mut map = Map::new();
                    for (k, v) in entries {
                        let path = format!("{name}[{k}]");
                        coerce_at(&Value::String(k.clone()), key(), &path, depth)?;
                        map.insert(k, coerce_at(&Value::String(v.to_string()), value(), &path, depth)?);
                    }
                    target.insert(field.serde_name.to_string(), Value::Object(map));
                    true
                }
            }
            _ => match query.last(name) {
                Some(raw) => {
                    let value = coerce_at(&Value::String(raw.to_string()), field.ty, name, depth)?;
                    target.insert(field.serde_name.to_string(), value);
                    true
                }
                None => false,
            },
        };
        if touched {
            touched_any = true;
            if let Some(group) = field.optional_group {
                if !groups.contains(&group) {
                    groups.push(group);
                }
            }
        }
    }
    fill_groups(target, desc, &groups, depth);
    Ok(touched_any)
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
