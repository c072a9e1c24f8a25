//! # Request Options
//!
//! Per-request option record built from configured header definitions, the parsed
//! `User-Agent` and computed extensions (`requestId`, `timeout`).
//!
//! Extraction never fails: required options that are missing are reported through
//! an optional collector, and the pipeline decides what to do about them.

use axum::http::header::USER_AGENT;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::types::RestRequest;
use crate::mapping::fields::{get_path, set_path};
use crate::middleware::user_agent::parse_user_agent;

/// Options extracted for one request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RequestOptions {
    values: Map<String, Value>,
}

impl RequestOptions {
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Read an option; dotted paths reach into nested options
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.values
            .get(path)
            .or_else(|| get_path_in_map(&self.values, path))
    }

    pub fn request_id(&self) -> Option<&str> {
        self.values.get("requestId").and_then(Value::as_str)
    }

    /// Effective deadline in milliseconds
    pub fn timeout(&self) -> Option<u64> {
        self.values.get("timeout").and_then(Value::as_u64)
    }

    pub fn language_code(&self) -> Option<&str> {
        self.values.get("languageCode").and_then(Value::as_str)
    }

    pub fn user_agent(&self) -> Option<&Value> {
        self.values.get("userAgent")
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

fn get_path_in_map<'a>(values: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let (head, tail) = path.split_once('.')?;
    get_path(values.get(head)?, tail)
}

/// One configured option
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDefinition {
    pub header_name: String,
    pub option_name: Option<String>,
    pub required: bool,
}

impl OptionDefinition {
    /// Read a bare header name or `{headerName, optionName, required}`; `None` when no header is named
    pub fn from_value(definition: &Value) -> Option<Self> {
        let parsed = match definition {
            Value::String(header_name) => Self {
                header_name: header_name.clone(),
                option_name: None,
                required: false,
            },
            Value::Object(fields) => Self {
                header_name: fields
                    .get("headerName")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                option_name: fields
                    .get("optionName")
                    .and_then(Value::as_str)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string),
                required: fields.get("required").and_then(Value::as_bool).unwrap_or(false),
            },
            _ => return None,
        };
        if parsed.header_name.is_empty() {
            None
        } else {
            Some(parsed)
        }
    }
}

/// Extraction settings
#[derive(Debug, Clone, Default)]
pub struct ExtractSettings {
    pub user_agent_enabled: bool,
    /// Applied last; a `None` value never erases a header-derived one
    pub extensions: Vec<(String, Option<Value>)>,
}

/// Build the option record for a request.
///
/// Keys of required definitions whose header is absent are pushed onto `missing`.
pub fn extract_request_options(
    request: &RestRequest,
    definitions: &Map<String, Value>,
    settings: &ExtractSettings,
    mut missing: Option<&mut Vec<String>>,
) -> RequestOptions {
    let mut record = Value::Object(Map::new());

    for (option_key, definition) in definitions {
        let Some(definition) = OptionDefinition::from_value(definition) else {
            continue;
        };
        let option_name = definition.option_name.as_deref().unwrap_or(option_key);
        match request.header(&definition.header_name) {
            Some(value) => set_path(&mut record, option_name, Value::String(value.to_string())),
            None => {
                if definition.required {
                    if let Some(missing) = missing.as_deref_mut() {
                        missing.push(option_key.clone());
                    }
                }
            }
        }
    }

    let mut values = match record {
        Value::Object(values) => values,
        _ => Map::new(),
    };

    if settings.user_agent_enabled {
        let user_agent = request
            .headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok());
        values.insert("userAgent".to_string(), parse_user_agent(user_agent));
    }

    for (key, value) in &settings.extensions {
        if let Some(value) = value {
            values.insert(key.clone(), value.clone());
        }
    }

    RequestOptions { values }
}
