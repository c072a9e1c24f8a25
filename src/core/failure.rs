//! # Request-Time Failures
//!
//! A pipeline stage can fail with anything: an error produced by an error builder,
//! a bare string, a list, a plain JSON object, even `null`. [`Failure`] keeps that
//! shape intact so the error-to-packet transformer can classify it, instead of
//! collapsing everything into one error struct up front.

use serde_json::{json, Map, Value};
use std::fmt;
use thiserror::Error;

use crate::core::error::GatewayError;

/// An error-like failure: a name, an optional message and whatever fields the
/// error builder attached (`returnCode`, `packageRef`, ...).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorValue {
    pub name: String,
    pub message: Option<String>,
    pub status_code: Option<u16>,
    pub payload: Option<Value>,
    pub stack: Option<String>,
    /// Extra named fields; response options may copy them into headers
    pub fields: Map<String, Value>,
}

impl ErrorValue {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_stack<S: Into<String>>(mut self, stack: S) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_field<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Look up a named property the way a dynamic error object would expose it
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "name" => Some(Value::String(self.name.clone())),
            "message" => self.message.clone().map(Value::String),
            "statusCode" => self.status_code.map(Value::from),
            "payload" => self.payload.clone(),
            "stack" => self.stack.clone().map(Value::String),
            other => self.fields.get(other).cloned(),
        }
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.field(key).is_some()
    }

    /// JSON view used when an error ends up nested inside another payload
    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("name".to_string(), Value::String(self.name.clone()));
        if let Some(message) = &self.message {
            object.insert("message".to_string(), Value::String(message.clone()));
        }
        if let Some(status_code) = self.status_code {
            object.insert("statusCode".to_string(), Value::from(status_code));
        }
        if let Some(payload) = &self.payload {
            object.insert("payload".to_string(), payload.clone());
        }
        Value::Object(object)
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.name, message),
            None => write!(f, "{}", self.name),
        }
    }
}

impl std::error::Error for ErrorValue {}

/// Any value a pipeline stage may reject with
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Failure {
    /// An error object (has a name, maybe a status code and payload)
    #[error("{0}")]
    Error(ErrorValue),

    #[error("null")]
    Null,

    #[error("undefined")]
    Undefined,

    #[error("{0}")]
    Text(String),

    #[error("list of {} failures", .0.len())]
    List(Vec<Failure>),

    /// A plain object that is not an error
    #[error("{}", Value::Object(.0.clone()))]
    Object(Map<String, Value>),

    /// Numbers and booleans
    #[error("{0}")]
    Scalar(Value),
}

impl Failure {
    /// Classify an arbitrary JSON value as a failure
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::String(text) => Self::Text(text),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from_value).collect()),
            Value::Object(object) => Self::Object(object),
            scalar => Self::Scalar(scalar),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Error(error) => error.to_value(),
            Self::Null | Self::Undefined => Value::Null,
            Self::Text(text) => Value::String(text.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            Self::Object(object) => Value::Object(object.clone()),
            Self::Scalar(value) => value.clone(),
        }
    }

    /// The `typeof`-style tag used in classified packet bodies
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Error(_) | Self::List(_) | Self::Object(_) => "object",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Text(_) => "string",
            Self::Scalar(Value::Bool(_)) => "boolean",
            Self::Scalar(Value::Number(_)) => "number",
            Self::Scalar(_) => "object",
        }
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> String {
        match self {
            Self::Error(error) => error.name.clone(),
            other => other.type_name().to_string(),
        }
    }

    pub fn as_error(&self) -> Option<&ErrorValue> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Shorthand for an ad-hoc named error
    pub fn named<N: Into<String>, M: Into<String>>(name: N, message: M) -> Self {
        Self::Error(ErrorValue::new(name).with_message(message))
    }
}

impl From<ErrorValue> for Failure {
    fn from(error: ErrorValue) -> Self {
        Self::Error(error)
    }
}

impl From<GatewayError> for Failure {
    fn from(error: GatewayError) -> Self {
        Self::Error(
            ErrorValue::new(error.error_type())
                .with_message(error.to_string())
                .with_status(error.status_code().as_u16()),
        )
    }
}

impl From<serde_json::Error> for Failure {
    fn from(error: serde_json::Error) -> Self {
        GatewayError::from(error).into()
    }
}

impl From<&str> for Failure {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Failure {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Builds the `{type, message}` body fragment shared by scalar classifications
pub(crate) fn scalar_body(failure: &Failure) -> Value {
    match failure {
        Failure::Null => json!({ "type": "null", "message": "Error is null" }),
        Failure::Text(text) => json!({ "type": "string", "message": text }),
        Failure::List(_) => json!({ "type": "array", "payload": failure.to_value() }),
        Failure::Undefined => json!({
            "type": "undefined",
            "message": "Error: undefined",
        }),
        Failure::Scalar(value) => json!({
            "type": failure.type_name(),
            "message": format!("Error: {}", value),
            "payload": value,
        }),
        Failure::Error(_) | Failure::Object(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_value_classifies_json() {
        assert_eq!(Failure::from_value(Value::Null), Failure::Null);
        assert_eq!(Failure::from_value(json!("boom")), Failure::Text("boom".into()));
        assert_eq!(Failure::from_value(json!(true)).type_name(), "boolean");
        assert_eq!(Failure::from_value(json!(12)).type_name(), "number");
        assert!(matches!(Failure::from_value(json!({"a": 1})), Failure::Object(_)));
        assert!(matches!(Failure::from_value(json!([1, "x"])), Failure::List(items) if items.len() == 2));
    }

    #[test]
    fn test_error_value_fields() {
        let error = ErrorValue::new("ResourceNotFound")
            .with_status(404)
            .with_field("returnCode", json!(1001));
        assert_eq!(error.field("returnCode"), Some(json!(1001)));
        assert_eq!(error.field("statusCode"), Some(json!(404)));
        assert!(!error.has_field("message"));
        assert_eq!(error.to_string(), "ResourceNotFound");
    }

    #[test]
    fn test_gateway_error_becomes_named_failure() {
        let failure: Failure = GatewayError::validation("number is missing").into();
        let error = failure.as_error().unwrap();
        assert_eq!(error.name, "RequestValidationError");
        assert_eq!(error.status_code, Some(400));
    }

    #[test]
    fn test_scalar_body_for_boolean() {
        let body = scalar_body(&Failure::Scalar(json!(true)));
        assert_eq!(
            body,
            json!({"type": "boolean", "message": "Error: true", "payload": true})
        );
    }
}
