//! Declarative request validation.
//!
//! Every inbound operation declares a JSON Schema document through the
//! [`Validate`] trait. The schema runs over the raw JSON payload before
//! deserialization so that missing fields, wrong types, out-of-range values
//! and unknown enum members are all reported together as [`FieldError`]
//! entries with a stable machine-readable code.
//!
//! Messages never echo the rejected value, only the constraint.

use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, LazyLock, RwLock},
};

use bastion_control_const::limits::{COMMON_NAME_PATTERN, SERVICE_NAME_PATTERN};
use jsonschema::{Validator, error::ValidationErrorKind};
use regex::Regex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{Error, Result};

/// Machine-readable validation codes
pub mod codes {
    pub const REQUIRED: &str = "required";
    pub const INVALID_TYPE: &str = "invalid_type";
    pub const TOO_SMALL: &str = "too_small";
    pub const TOO_BIG: &str = "too_big";
    pub const INVALID_ENUM_VALUE: &str = "invalid_enum_value";
    pub const INVALID_STRING: &str = "invalid_string";
    pub const INVALID_JSON: &str = "invalid_json";
    pub const UNKNOWN_SERVICE: &str = "unknown_service";
}

static SERVICE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    // SAFETY: the pattern is a compile-time constant covered by tests
    #[allow(clippy::expect_used)]
    Regex::new(SERVICE_NAME_PATTERN).expect("valid service name pattern")
});

static COMMON_NAME: LazyLock<Regex> = LazyLock::new(|| {
    // SAFETY: the pattern is a compile-time constant covered by tests
    #[allow(clippy::expect_used)]
    Regex::new(COMMON_NAME_PATTERN).expect("valid common name pattern")
});

/// Compiled validators, one per request type
static VALIDATORS: LazyLock<RwLock<HashMap<TypeId, Arc<Validator>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Compiled pattern for service names (`[a-z0-9][a-z0-9_-]{0,62}`)
pub fn service_name_regex() -> &'static Regex {
    &SERVICE_NAME
}

/// Compiled pattern for certificate common names
pub fn common_name_regex() -> &'static Regex {
    &COMMON_NAME
}

/// One rejected field of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    /// Dot-separated path to the field (`""` for the payload itself)
    pub field_path: String,
    /// Human-readable description of the violated constraint
    pub message: String,
    /// Machine-readable code from [`codes`]
    pub code: String,
}

impl FieldError {
    pub fn new(
        field_path: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self { field_path: field_path.into(), message: message.into(), code: code.into() }
    }
}

/// Implemented by every request payload accepted by the API
pub trait Validate {
    /// JSON Schema (draft 2020-12) the raw payload must satisfy
    ///
    /// Errors are reported in the order fields appear under `properties`.
    fn schema() -> Value;

    /// Constraints JSON Schema cannot express, run after the schema
    fn check(_payload: &Value, _errors: &mut Vec<FieldError>) {}
}

/// Require at least `min` characters once surrounding whitespace is trimmed
///
/// Absent and non-string values are left to the schema.
pub fn check_trimmed_min_len(payload: &Value, field: &str, min: usize, errors: &mut Vec<FieldError>) {
    if let Some(s) = payload.get(field).and_then(Value::as_str)
        && s.trim().chars().count() < min
    {
        errors.push(FieldError::new(
            field,
            format!("{field} must be at least {min} characters long"),
            codes::TOO_SMALL,
        ));
    }
}

fn compile(schema: &Value) -> Result<Validator> {
    jsonschema::options()
        .build(schema)
        .map_err(|e| Error::internal(format!("Invalid request schema: {e}")))
}

fn validator_for<T: Validate + 'static>(schema: &Value) -> Result<Arc<Validator>> {
    let id = TypeId::of::<T>();
    if let Some(validator) = VALIDATORS.read().unwrap_or_else(|p| p.into_inner()).get(&id) {
        return Ok(Arc::clone(validator));
    }

    let validator = Arc::new(compile(schema)?);
    VALIDATORS.write().unwrap_or_else(|p| p.into_inner()).insert(id, Arc::clone(&validator));
    Ok(validator)
}

/// `null` members count as absent, matching how optional fields deserialize
fn strip_nulls(value: &mut Value) {
    if let Value::Object(map) = value {
        map.retain(|_, v| !v.is_null());
        map.values_mut().for_each(strip_nulls);
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// JSON pointer (`/meta/draft`) to dotted field path (`meta.draft`)
fn field_path(pointer: &str) -> String {
    pointer
        .split('/')
        .skip(1)
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

/// Sub-schema describing the value at `pointer`
fn schema_at<'a>(schema: &'a Value, pointer: &str) -> Option<&'a Value> {
    pointer
        .split('/')
        .skip(1)
        .try_fold(schema, |node, segment| node.get("properties")?.get(segment))
}

fn field_error(schema: &Value, payload: &Value, error: &jsonschema::ValidationError<'_>) -> FieldError {
    let pointer = error.instance_path().to_string();
    let path = field_path(&pointer);
    let subject = if path.is_empty() { "payload".to_string() } else { path.clone() };

    match error.kind() {
        ValidationErrorKind::Required { property } => {
            let name = property.as_str().unwrap_or_default();
            let path = if path.is_empty() { name.to_string() } else { format!("{path}.{name}") };
            FieldError::new(&path, format!("{path} is required"), codes::REQUIRED)
        },
        ValidationErrorKind::Type { .. } => {
            let expected = schema_at(schema, &pointer)
                .and_then(|s| s.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("a different type");
            let received = payload.pointer(&pointer).map(json_type_name).unwrap_or("nothing");
            FieldError::new(path, format!("Expected {expected}, received {received}"), codes::INVALID_TYPE)
        },
        ValidationErrorKind::MinLength { limit } => FieldError::new(
            path,
            format!("{subject} must be at least {limit} characters long"),
            codes::TOO_SMALL,
        ),
        ValidationErrorKind::MaxLength { limit } => FieldError::new(
            path,
            format!("{subject} must be at most {limit} characters long"),
            codes::TOO_BIG,
        ),
        ValidationErrorKind::Minimum { limit } => FieldError::new(
            path,
            format!("{subject} must be greater than or equal to {limit}"),
            codes::TOO_SMALL,
        ),
        ValidationErrorKind::Maximum { limit } => FieldError::new(
            path,
            format!("{subject} must be less than or equal to {limit}"),
            codes::TOO_BIG,
        ),
        ValidationErrorKind::Enum { .. } => {
            let allowed = schema_at(schema, &pointer)
                .and_then(|s| s.get("enum"))
                .and_then(Value::as_array)
                .map(|options| options.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            FieldError::new(
                path,
                format!("{subject} must be one of: {allowed}"),
                codes::INVALID_ENUM_VALUE,
            )
        },
        ValidationErrorKind::Pattern { .. } => FieldError::new(
            path,
            format!("{subject} has an invalid format"),
            codes::INVALID_STRING,
        ),
        _ => FieldError::new(path, format!("{subject} is not allowed here"), codes::INVALID_TYPE),
    }
}

/// Position of the field's top-level property in the schema; the payload itself sorts first
fn field_rank(schema: &Value, field_path: &str) -> usize {
    if field_path.is_empty() {
        return 0;
    }
    let top = field_path.split('.').next().unwrap_or_default();
    schema
        .get("properties")
        .and_then(Value::as_object)
        .and_then(|properties| properties.keys().position(|key| key == top))
        .map_or(usize::MAX, |position| position + 1)
}

/// Run `schema` and the type's own checks over a payload
///
/// A field with the wrong type reports only that, not the constraints that
/// would have applied to a value of the right type.
fn collect_errors<T: Validate>(
    validator: &Validator,
    schema: &Value,
    payload: &Value,
) -> Vec<FieldError> {
    let mut errors: Vec<FieldError> =
        validator.iter_errors(payload).map(|error| field_error(schema, payload, &error)).collect();
    T::check(payload, &mut errors);

    let mistyped: Vec<String> = errors
        .iter()
        .filter(|e| e.code == codes::INVALID_TYPE)
        .map(|e| e.field_path.clone())
        .collect();
    errors.retain(|e| e.code == codes::INVALID_TYPE || !mistyped.contains(&e.field_path));
    errors.sort_by_key(|e| field_rank(schema, &e.field_path));
    errors
}

/// Validate a raw JSON payload against `T`'s schema, then deserialize it
///
/// Returns a `VALIDATION_ERROR` carrying every violated constraint.
pub fn parse_validated<T>(mut value: Value) -> Result<T>
where
    T: Validate + DeserializeOwned + 'static,
{
    strip_nulls(&mut value);

    let schema = T::schema();
    let validator = validator_for::<T>(&schema)?;
    let errors = collect_errors::<T>(&validator, &schema, &value);
    if !errors.is_empty() {
        return Err(Error::validation_details("Validation failed", errors));
    }

    serde_json::from_value(value).map_err(|e| {
        Error::invalid_field(
            "",
            codes::INVALID_TYPE,
            format!("Payload does not match the expected shape ({})", serde_category(&e)),
        )
    })
}

// serde messages can quote input values, so only the category is surfaced
fn serde_category(e: &serde_json::Error) -> &'static str {
    match e.classify() {
        serde_json::error::Category::Io => "io",
        serde_json::error::Category::Syntax => "syntax",
        serde_json::error::Category::Data => "data",
        serde_json::error::Category::Eof => "eof",
    }
}

/// Validate a service name outside of a payload (e.g. a path parameter)
pub fn validate_service_name(field_path: &str, name: &str) -> Result<()> {
    if service_name_regex().is_match(name) {
        Ok(())
    } else {
        Err(Error::invalid_field(
            field_path,
            codes::INVALID_STRING,
            format!("{field_path} has an invalid format"),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Draft {
        prompt: String,
        #[serde(rename = "durationSeconds")]
        duration_seconds: Option<i64>,
        style: Option<String>,
    }

    impl Validate for Draft {
        fn schema() -> Value {
            json!({
                "type": "object",
                "required": ["prompt"],
                "properties": {
                    "prompt": { "type": "string", "maxLength": 50 },
                    "durationSeconds": { "type": "integer", "minimum": 1, "maximum": 90 },
                    "style": { "type": "string", "enum": ["cinematic", "anime"] },
                    "probability": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                    "meta": {
                        "type": "object",
                        "required": ["draft"],
                        "properties": { "draft": { "type": "boolean" } }
                    }
                }
            })
        }

        fn check(payload: &Value, errors: &mut Vec<FieldError>) {
            check_trimmed_min_len(payload, "prompt", 10, errors);
        }
    }

    fn errors(payload: Value) -> Vec<FieldError> {
        match parse_validated::<Draft>(payload) {
            Ok(_) => Vec::new(),
            Err(e) => e.details().to_vec(),
        }
    }

    #[test]
    fn accepts_valid_payload() {
        let found = errors(json!({
            "prompt": "a 12-character prompt",
            "durationSeconds": 5,
            "style": "anime",
            "probability": 0.5,
            "meta": { "draft": true },
        }));
        assert!(found.is_empty(), "{found:?}");
    }

    #[test]
    fn reports_missing_required_field() {
        assert_eq!(
            errors(json!({})),
            vec![FieldError::new("prompt", "prompt is required", "required")]
        );
    }

    #[test]
    fn null_counts_as_missing() {
        assert_eq!(errors(json!({ "prompt": null }))[0].code, codes::REQUIRED);
        assert!(errors(json!({ "prompt": "long enough prompt", "style": null })).is_empty());
    }

    #[test]
    fn reports_short_prompt_after_trim() {
        let found = errors(json!({ "prompt": "   short    " }));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].field_path, "prompt");
        assert_eq!(found[0].code, codes::TOO_SMALL);
    }

    #[test]
    fn reports_every_violation_in_declaration_order() {
        let found = errors(json!({
            "probability": 1.5,
            "style": "noir",
            "durationSeconds": 120,
            "prompt": 42,
        }));
        let codes: Vec<_> = found.iter().map(|e| (e.field_path.as_str(), e.code.as_str())).collect();
        assert_eq!(
            codes,
            vec![
                ("prompt", "invalid_type"),
                ("durationSeconds", "too_big"),
                ("style", "invalid_enum_value"),
                ("probability", "too_big"),
            ]
        );
    }

    #[test]
    fn wrong_type_hides_other_constraints() {
        let found = errors(json!({ "prompt": "long enough prompt", "style": 7 }));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, codes::INVALID_TYPE);
    }

    #[test]
    fn integer_rejects_fractional_values() {
        let found = errors(json!({ "prompt": "long enough prompt", "durationSeconds": 2.5 }));
        assert_eq!(found[0].field_path, "durationSeconds");
        assert_eq!(found[0].code, codes::INVALID_TYPE);
        assert_eq!(found[0].message, "Expected integer, received number");
    }

    #[test]
    fn nested_paths_are_dot_separated() {
        let found = errors(json!({ "prompt": "long enough prompt", "meta": {} }));
        assert_eq!(found[0].field_path, "meta.draft");
        assert_eq!(found[0].code, codes::REQUIRED);
    }

    #[test]
    fn non_object_payload_is_rejected_at_root() {
        let found = errors(json!(["prompt"]));
        assert_eq!(found[0].field_path, "");
        assert_eq!(found[0].code, codes::INVALID_TYPE);
        assert_eq!(found[0].message, "Expected object, received array");
    }

    #[test]
    fn messages_do_not_echo_values() {
        let found = errors(json!({ "prompt": "hunter2", "style": "s3cr3t-style" }));
        assert_eq!(found.len(), 2);
        for error in found {
            assert!(!error.message.contains("hunter2"));
            assert!(!error.message.contains("s3cr3t"));
        }
    }

    #[test]
    fn parse_validated_returns_typed_value() {
        let draft: Draft = parse_validated(json!({ "prompt": "a sufficiently long prompt" })).unwrap();
        assert_eq!(draft.prompt, "a sufficiently long prompt");
    }

    #[test]
    fn parse_validated_returns_validation_error() {
        let err = parse_validated::<Draft>(json!({ "prompt": "short" })).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert_eq!(err.details()[0].code, codes::TOO_SMALL);
    }

    #[test]
    fn pointer_segments_are_unescaped() {
        assert_eq!(field_path(""), "");
        assert_eq!(field_path("/meta/draft"), "meta.draft");
        assert_eq!(field_path("/a~1b/c~0d"), "a/b.c~d");
    }

    #[test]
    fn service_name_pattern() {
        assert!(validate_service_name("serviceName", "media-generation").is_ok());
        assert!(validate_service_name("serviceName", "feed_v2").is_ok());
        assert!(validate_service_name("serviceName", "").is_err());
        assert!(validate_service_name("serviceName", "Feed").is_err());
        assert!(validate_service_name("serviceName", "-feed").is_err());
        assert!(validate_service_name("serviceName", "feed/../etc").is_err());
        assert!(validate_service_name("serviceName", &"a".repeat(64)).is_err());
    }

    #[test]
    fn common_name_pattern() {
        assert!(common_name_regex().is_match("feed.internal.bastion"));
        assert!(common_name_regex().is_match("worker-01"));
        assert!(!common_name_regex().is_match(".leading-dot"));
        assert!(!common_name_regex().is_match("has space"));
        assert!(!common_name_regex().is_match("cn=evil,o=x"));
    }
}
