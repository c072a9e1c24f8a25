//! # Error Handling Module
//!
//! Setup-time errors for the REST front: loading configuration, reading mapping
//! sources, building routers. These are the failures that happen before a request
//! ever reaches a pipeline, so they are reported to the operator rather than
//! rendered to a client.
//!
//! Request-time failures use [`crate::core::failure::Failure`] instead, because a
//! pipeline has to be able to classify *any* failure value (strings, arrays, plain
//! objects) and not only errors the gateway itself produced.
//!
//! ## Conventions
//! - Every fallible setup function returns [`GatewayResult<T>`]
//! - `thiserror` derives `Display` and `std::error::Error` from the `#[error]` attributes
//! - `From` conversions let `?` lift IO/JSON/YAML errors into [`GatewayError`]

use axum::http::StatusCode;
use thiserror::Error;

/// Main result type used throughout the crate
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Setup-time error types for the REST front
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A mapping source could not be loaded or normalized
    #[error("Mapping error ({source_name}): {message}")]
    Mapping { source_name: String, message: String },

    /// Request validation errors (invalid headers, malformed body, etc.)
    #[error("Request validation failed: {field} - {reason}")]
    RequestValidation { field: String, reason: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors (file operations, network errors, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a mapping error attributed to a mapping source
    pub fn mapping<N: Into<String>, S: Into<String>>(source_name: N, message: S) -> Self {
        Self::Mapping {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::RequestValidation {
            field: "general".to_string(),
            reason: message.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RequestValidation { .. } => StatusCode::BAD_REQUEST,
            Self::Json { .. } => StatusCode::BAD_REQUEST,
            Self::Configuration { .. }
            | Self::Mapping { .. }
            | Self::Internal { .. }
            | Self::Io { .. }
            | Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "ConfigurationError",
            Self::Mapping { .. } => "MappingError",
            Self::RequestValidation { .. } => "RequestValidationError",
            Self::Internal { .. } => "InternalError",
            Self::Io { .. } => "IoError",
            Self::Json { .. } => "JsonError",
            Self::Yaml { .. } => "YamlError",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}
