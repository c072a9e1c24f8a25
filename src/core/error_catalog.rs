//! # Error Catalog
//!
//! Error codes are declared per mapping source (or per portlet) as
//! `name -> {message, returnCode, statusCode}`. An [`ErrorBuilder`] turns a code name
//! plus request context into an [`ErrorValue`]; the [`ErrorManager`] keeps one builder
//! per registered source so every mapping can report errors under its own codes.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::core::failure::ErrorValue;

/// One declared error code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCode {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub return_code: Option<i64>,
    #[serde(default)]
    pub status_code: Option<u16>,
}

impl ErrorCode {
    pub fn new(message: &str, return_code: i64, status_code: u16) -> Self {
        Self {
            message: Some(message.to_string()),
            return_code: Some(return_code),
            status_code: Some(status_code),
        }
    }
}

/// Optional context supplied when an error is built
#[derive(Debug, Clone, Default)]
pub struct ErrorOptions {
    pub message: Option<String>,
    pub payload: Option<Value>,
    pub language: Option<String>,
}

impl ErrorOptions {
    pub fn payload(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            ..Default::default()
        }
    }
}

/// Factory of tagged error values
pub trait ErrorBuilder: Send + Sync + fmt::Debug {
    fn new_error(&self, name: &str, options: ErrorOptions) -> ErrorValue;
}

/// Registry of error builders, one per error source
pub trait ErrorManager: Send + Sync {
    /// Builder registered for a mapping source, if any
    fn get_error_builder(&self, source_name: &str) -> Option<Arc<dyn ErrorBuilder>>;

    /// Register (or extend) the codes of a package and return its builder
    fn register(
        &self,
        package_name: &str,
        error_codes: &BTreeMap<String, ErrorCode>,
    ) -> Arc<dyn ErrorBuilder>;
}

/// The codes every portlet understands, overridable by configuration
pub fn default_error_codes() -> BTreeMap<String, ErrorCode> {
    let mut codes = BTreeMap::new();
    codes.insert(
        "RequestOptionNotFound".to_string(),
        ErrorCode::new("Required request options not found", 100, 400),
    );
    codes.insert(
        "RequestTimeoutOnServer".to_string(),
        ErrorCode::new("Request timeout", 101, 408),
    );
    codes.insert(
        "RequestPreValidationError".to_string(),
        ErrorCode::new("The http request is invalid", 102, 400),
    );
    codes.insert(
        "RequestPostValidationError".to_string(),
        ErrorCode::new("The sanitized body is invalid", 103, 400),
    );
    codes
}

/// Error builder backed by a table of declared codes
#[derive(Debug, Clone)]
pub struct ErrorCatalog {
    package_name: String,
    codes: BTreeMap<String, ErrorCode>,
}

impl ErrorCatalog {
    pub fn new<S: Into<String>>(package_name: S, codes: BTreeMap<String, ErrorCode>) -> Self {
        Self {
            package_name: package_name.into(),
            codes,
        }
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn code(&self, name: &str) -> Option<&ErrorCode> {
        self.codes.get(name)
    }
}

impl ErrorBuilder for ErrorCatalog {
    fn new_error(&self, name: &str, options: ErrorOptions) -> ErrorValue {
        let code = self.codes.get(name);
        let message = options
            .message
            .or_else(|| code.and_then(|c| c.message.clone()));

        let mut error = ErrorValue::new(name)
            .with_field("packageRef", json!(self.package_name));
        if let Some(message) = &message {
            error = error.with_message(message.clone());
        }
        if let Some(code) = code {
            if let Some(status_code) = code.status_code {
                error = error.with_status(status_code);
            }
            if let Some(return_code) = code.return_code {
                error = error.with_field("returnCode", json!(return_code));
            }
        }
        if let Some(payload) = options.payload {
            error = error.with_payload(payload);
        }
        if let Some(language) = options.language {
            error = error.with_field("language", json!(language));
        }
        error.with_stack(format!(
            "{}: {}\n    at {}",
            name,
            message.unwrap_or_default(),
            self.package_name
        ))
    }
}

/// In-process [`ErrorManager`]
#[derive(Debug, Default)]
pub struct ErrorRegistry {
    catalogs: DashMap<String, Arc<ErrorCatalog>>,
}

impl ErrorRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ErrorManager for ErrorRegistry {
    fn get_error_builder(&self, source_name: &str) -> Option<Arc<dyn ErrorBuilder>> {
        self.catalogs
            .get(source_name)
            .map(|catalog| catalog.value().clone() as Arc<dyn ErrorBuilder>)
    }

    fn register(
        &self,
        package_name: &str,
        error_codes: &BTreeMap<String, ErrorCode>,
    ) -> Arc<dyn ErrorBuilder> {
        let mut codes = self
            .catalogs
            .get(package_name)
            .map(|existing| existing.codes.clone())
            .unwrap_or_default();
        codes.extend(error_codes.iter().map(|(k, v)| (k.clone(), v.clone())));

        debug!(package = package_name, codes = codes.len(), "Registered error codes");

        let catalog = Arc::new(ErrorCatalog::new(package_name, codes));
        self.catalogs
            .insert(package_name.to_string(), catalog.clone());
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_code_fills_status_and_return_code() {
        let catalog = ErrorCatalog::new("restfront", default_error_codes());
        let error = catalog.new_error(
            "RequestOptionNotFound",
            ErrorOptions::payload(json!({"requestOptions": ["tenantId"]})),
        );
        assert_eq!(error.status_code, Some(400));
        assert_eq!(error.field("returnCode"), Some(json!(100)));
        assert_eq!(error.field("packageRef"), Some(json!("restfront")));
        assert_eq!(error.message.as_deref(), Some("Required request options not found"));
        assert_eq!(error.payload, Some(json!({"requestOptions": ["tenantId"]})));
    }

    #[test]
    fn test_unknown_code_keeps_name_only() {
        let catalog = ErrorCatalog::new("restfront", BTreeMap::new());
        let error = catalog.new_error("Whatever", ErrorOptions::default());
        assert_eq!(error.name, "Whatever");
        assert_eq!(error.status_code, None);
        assert!(!error.has_field("returnCode"));
    }

    #[test]
    fn test_registry_extends_existing_catalog() {
        let registry = ErrorRegistry::new();
        registry.register("example-mappings", &default_error_codes());

        let mut extra = BTreeMap::new();
        extra.insert("MaximumExceeding".to_string(), ErrorCode::new("Too big", 2002, 500));
        registry.register("example-mappings", &extra);

        let builder = registry.get_error_builder("example-mappings").unwrap();
        assert_eq!(builder.new_error("MaximumExceeding", ErrorOptions::default()).status_code, Some(500));
        assert_eq!(builder.new_error("RequestTimeoutOnServer", ErrorOptions::default()).status_code, Some(408));
        assert!(registry.get_error_builder("unknown").is_none());
    }
}
