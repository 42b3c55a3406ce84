//! Request validation collaborator.
//!
//! The dispatcher hands every materialized request to a [`Validator`] before
//! the handler runs; any error becomes a client-error envelope. Applications
//! plug in their own engine, use [`RuleValidator`] for the `v:"..."` rules in
//! field annotations, or [`NoValidation`] to skip the step.

use std::any::Any;
use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::descriptor::{fields, Kind, TypeDescriptor};
use crate::meta::Rule;

const MAX_DEPTH: usize = 32;

/// A materialized request as seen by a validator.
#[derive(Clone, Copy)]
pub struct Validatable<'a> {
    pub descriptor: &'static TypeDescriptor,
    /// JSON form the request was decoded from
    pub value: &'a Value,
    /// The typed request object
    pub object: &'a dyn Any,
}

impl<'a> Validatable<'a> {
    #[must_use]
    pub fn downcast<T: 'static>(&self) -> Option<&'a T> {
        self.object.downcast_ref::<T>()
    }
}

impl fmt::Debug for Validatable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validatable")
            .field("descriptor", &self.descriptor.name)
            .field("value", self.value)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: Option<String>,
    /// Name of the failed rule, if the validator reports one
    pub rule: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            rule: None,
            message: message.into(),
        }
    }

    pub fn for_field(
        field: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: Some(field.into()),
            rule: Some(rule.into()),
            message: message.into(),
        }
    }

    /// Whether a `required` rule failed.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.rule.as_deref() == Some("required")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

pub trait Validator: Send + Sync {
    fn validate(&self, target: &Validatable<'_>) -> Result<(), ValidationError>;
}

impl<F> Validator for F
where
    F: Fn(&Validatable<'_>) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, target: &Validatable<'_>) -> Result<(), ValidationError> {
        self(target)
    }
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoValidation;

impl Validator for NoValidation {
    fn validate(&self, _target: &Validatable<'_>) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Checks the `v:"..."` rules declared on request fields.
///
/// | Rule | Passes when |
/// |---|---|
/// | `required` | value is not null, `""`, `[]` or `{}` |
/// | `min:N` / `max:N` | numeric value is within the bound |
/// | `length:A,B` | string (chars) or array length is in `A..=B` |
/// | `min-length:N` / `max-length:N` | one-sided length bound |
/// | `in:a,b,c` | value is one of the listed strings |
///
/// Unknown rules are ignored. Nested struct fields are checked recursively.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleValidator;

impl Validator for RuleValidator {
    fn validate(&self, target: &Validatable<'_>) -> Result<(), ValidationError> {
        check_struct(target.descriptor, target.value, "", 0)
    }
}

fn check_struct(
    desc: &'static TypeDescriptor,
    value: &Value,
    prefix: &str,
    depth: usize,
) -> Result<(), ValidationError> {
    let Value::Object(object) = value else {
        return Ok(());
    };
    if depth > MAX_DEPTH {
        return Ok(());
    }
    for field in fields(desc) {
        let name = if prefix.is_empty() {
            field.external_name.clone()
        } else {
            format!("{prefix}.{}", field.external_name)
        };
        let current = object.get(field.serde_name).unwrap_or(&Value::Null);
        if current.is_null() && field.optional {
            continue;
        }
        for rule in field.tag.rules() {
            check_rule(&rule, &name, current)?;
        }
        let target = field.target();
        if matches!(target.kind, Kind::Struct(_)) {
            check_struct(target, current, &name, depth + 1)?;
        }
    }
    Ok(())
}

fn check_rule(rule: &Rule<'_>, field: &str, value: &Value) -> Result<(), ValidationError> {
    let fail = |default: String| {
        Err(ValidationError::for_field(
            field,
            rule.name,
            rule.message.map(str::to_string).unwrap_or(default),
        ))
    };
    let args = rule.args.unwrap_or_default();
    match rule.name {
        "required" => {
            if is_empty(value) {
                return fail(format!("The {field} field is required"));
            }
        }
        "min" | "max" => {
            let (Some(actual), Ok(bound)) = (as_number(value), args.trim().parse::<f64>()) else {
                return Ok(());
            };
            if rule.name == "min" && actual < bound {
                return fail(format!("The {field} value must be at least {args}"));
            }
            if rule.name == "max" && actual > bound {
                return fail(format!("The {field} value must not exceed {args}"));
            }
        }
        "length" | "min-length" | "max-length" => {
            let Some(len) = length_of(value) else {
                return Ok(());
            };
            let (lo, hi): (Option<usize>, Option<usize>) = match rule.name {
                "length" => {
                    let (lo, hi) = args.split_once(',').unwrap_or((args, args));
                    (lo.trim().parse().ok(), hi.trim().parse().ok())
                }
                "min-length" => (args.trim().parse().ok(), None),
                _ => (None, args.trim().parse().ok()),
            };
            if lo.is_some_and(|lo| len < lo) || hi.is_some_and(|hi| len > hi) {
                return fail(format!("The {field} length must satisfy {} {args}", rule.name));
            }
        }
        "in" => {
            let actual = match value {
                Value::String(s) => s.clone(),
                Value::Null => return Ok(()),
                other => other.to_string(),
            };
            if !args.split(',').map(str::trim).any(|allowed| allowed == actual) {
                return fail(format!("The {field} value must be one of: {args}"));
            }
        }
        other => {
            debug!(rule = other, field, "Unknown validation rule ignored");
        }
    }
    Ok(())
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::meta::Meta;
    use crate::Describe;

    #[derive(Debug, Describe, Deserialize)]
    struct Inner {
        #[tag(v:"in:red,green#colour must be red or green")]
        colour: String,
    }

    #[derive(Debug, Describe, Deserialize)]
    struct Signup {
        #[meta(path:"/signup" method:"POST")]
        meta: Meta,
        #[tag(p:"user" v:"required|length:3,8")]
        name: String,
        #[tag(v:"min:18|max:130#too young|too old")]
        age: i32,
        #[tag(v:"required")]
        nickname: Option<String>,
        inner: Inner,
    }

    fn check(value: Value) -> Result<(), ValidationError> {
        let object = ();
        RuleValidator.validate(&Validatable {
            descriptor: Signup::descriptor(),
            value: &value,
            object: &object,
        })
    }

    fn valid() -> Value {
        json!({"meta": {}, "name": "annie", "age": 30, "nickname": null, "inner": {"colour": "red"}})
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(check(valid()).is_ok());
    }

    #[test]
    fn test_required_uses_lookup_name() {
        let mut v = valid();
        v["name"] = json!("");
        let err = check(v).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("user"));
        assert!(err.is_missing());
        assert_eq!(err.message, "The user field is required");
    }

    #[test]
    fn test_custom_messages_by_position() {
        let mut v = valid();
        v["age"] = json!(12);
        assert_eq!(check(v).unwrap_err().message, "too young");
        let mut v = valid();
        v["age"] = json!(200);
        assert_eq!(check(v).unwrap_err().message, "too old");
    }

    #[test]
    fn test_length_counts_chars() {
        let mut v = valid();
        v["name"] = json!("ab");
        assert_eq!(check(v).unwrap_err().rule.as_deref(), Some("length"));
    }

    #[test]
    fn test_nested_rules_are_checked() {
        let mut v = valid();
        v["inner"]["colour"] = json!("blue");
        let err = check(v).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("inner.colour"));
        assert_eq!(err.message, "colour must be red or green");
    }

    #[test]
    fn test_closures_are_validators() {
        let reject = |_: &Validatable<'_>| -> Result<(), ValidationError> {
            Err(ValidationError::new("nope"))
        };
        let value = json!({});
        let target = Validatable {
            descriptor: Signup::descriptor(),
            value: &value,
            object: &(),
        };
        assert_eq!(reject.validate(&target).unwrap_err().message, "nope");
        assert!(NoValidation.validate(&target).is_ok());
    }
}
