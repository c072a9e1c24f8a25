//! # Schema Validator Layer
//!
//! Mappings may declare a `validatorSchema` checked against the request body before
//! the pipeline runs. A failed check is answered directly with the check result
//! (`isError: true` plus the per-field errors) at `validatorSchema.statusCode` or 400.
//!
//! The schema format is field name to rules:
//!
//! ```yaml
//! validatorSchema:
//!   statusCode: 422
//!   number:
//!     type: number
//!     required: true
//!   name:
//!     type: string
//!     length: { min: 1, max: 32 }
//!     test: "^[a-z]+$"
//! ```

use regex::Regex;
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::{info, warn};

use crate::core::types::{Packet, RestRequest};
use crate::discovery::tracelog::TracelogService;
use crate::mapping::descriptor::MappingRecord;

/// Schema keys that configure the layer instead of describing a field
const RESERVED_KEYS: [&str; 1] = ["statusCode"];

/// Result of checking a body against a schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaCheck {
    pub has_error: bool,
    /// Field name to `{rule: {message}}`
    pub fields: Map<String, Value>,
}

impl SchemaCheck {
    /// Response body for a failed check
    pub fn to_body(&self) -> Value {
        let mut body = self.fields.clone();
        body.insert("isError".to_string(), Value::Bool(self.has_error));
        Value::Object(body)
    }
}

pub trait SchemaValidator: Send + Sync + fmt::Debug {
    fn check(&self, schema: &Value, body: &Value) -> SchemaCheck;
}

/// Field-rule validator: `type`, `required`, `length {min, max}`, `test` (regex)
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicSchemaValidator;

impl BasicSchemaValidator {
    fn check_field(name: &str, rules: &Map<String, Value>, value: Option<&Value>) -> Map<String, Value> {
        let mut errors = Map::new();
        let value = value.filter(|v| !v.is_null());
        let custom = rules.get("message").and_then(Value::as_str);
        let mut fail = |rule: &str, message: String| {
            errors.insert(
                rule.to_string(),
                json!({ "message": custom.map(str::to_string).unwrap_or(message) }),
            );
        };

        let Some(value) = value else {
            if rules.get("required").and_then(Value::as_bool).unwrap_or(false) {
                fail("required", format!("{} is required", name));
            }
            return errors;
        };

        if let Some(expected) = rules.get("type").and_then(Value::as_str) {
            let matches = match expected.to_ascii_lowercase().as_str() {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.is_i64() || value.is_u64(),
                "boolean" => value.is_boolean(),
                "object" => value.is_object(),
                "array" => value.is_array(),
                _ => true,
            };
            if !matches {
                fail("type", format!("{} must be of type {}", name, expected));
            }
        }

        if let Some(length) = rules.get("length") {
            let actual = match value {
                Value::String(text) => Some(text.chars().count()),
                Value::Array(items) => Some(items.len()),
                _ => None,
            };
            if let Some(actual) = actual {
                let min = length.get("min").and_then(Value::as_u64);
                let max = length.get("max").and_then(Value::as_u64);
                let actual = actual as u64;
                if min.is_some_and(|min| actual < min) || max.is_some_and(|max| actual > max) {
                    fail("length", format!("{} has an invalid length", name));
                }
            }
        }

        if let (Some(pattern), Some(text)) = (rules.get("test").and_then(Value::as_str), value.as_str()) {
            match Regex::new(pattern) {
                Ok(regex) if !regex.is_match(text) => {
                    fail("test", format!("{} does not match {}", name, pattern));
                }
                Ok(_) => {}
                Err(err) => warn!(field = name, error = %err, "Ignoring invalid schema pattern"),
            }
        }

        errors
    }
}

impl SchemaValidator for BasicSchemaValidator {
    fn check(&self, schema: &Value, body: &Value) -> SchemaCheck {
        let mut check = SchemaCheck::default();
        let Some(schema) = schema.as_object() else {
            return check;
        };
        for (name, rules) in schema {
            if RESERVED_KEYS.contains(&name.as_str()) {
                continue;
            }
            let Some(rules) = rules.as_object() else {
                continue;
            };
            let errors = Self::check_field(name, rules, body.get(name));
            if !errors.is_empty() {
                check.has_error = true;
                check.fields.insert(name.clone(), Value::Object(errors));
            }
        }
        check
    }
}

/// Run a mapping's schema check; `Some(packet)` when the request must be rejected
pub fn validate_request(
    mapping: &MappingRecord,
    request: &RestRequest,
    validator: &dyn SchemaValidator,
    tracelog: &dyn TracelogService,
) -> Option<Packet> {
    let schema = mapping.validator_schema()?;
    if !mapping.accepts_method(request.method.as_str()) {
        return None;
    }
    let request_id = tracelog.get_request_id(request);
    info!(
        request_id = %request_id,
        map_path = ?mapping.path().first(),
        method = %request.method,
        url = %request.url(),
        "Validate for Req[{}] from [{}]{}",
        request_id,
        request.method,
        request.url()
    );

    let check = validator.check(schema, &request.body);
    if !check.has_error {
        return None;
    }
    let status_code = schema
        .get("statusCode")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .unwrap_or(400);
    Some(Packet {
        status_code: Some(status_code),
        headers: Value::Null,
        body: check.to_body(),
    })
}
