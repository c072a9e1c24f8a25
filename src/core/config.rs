//! # Configuration Module
//!
//! Loads the REST front configuration: server settings, logging, and one
//! [`PortletConfig`] per mount point.
//!
//! ## Key Features
//! - YAML or JSON parsing with serde (chosen by file extension)
//! - Environment variable overrides (`RESTFRONT_*`)
//! - Validation that reports every problem at once

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::core::error::{GatewayError, GatewayResult};
use crate::core::error_catalog::ErrorCode;
use crate::mapping::fields::join_path;
use crate::observability::logging::{LogConfig, LogFormat};

pub const DEFAULT_CONTEXT_PATH: &str = "/restfront";
pub const DEFAULT_SERVICE_RESOLVER: &str = "app-opmaster/commander";
pub const DEFAULT_RETURN_CODE_HEADER: &str = "X-Return-Code";
pub const DEFAULT_PORTLET: &str = "default";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RestfrontConfig {
    pub server: ServerSettings,
    pub logging: LogConfig,
    /// Portlets by name; none declared means a single `default` portlet
    pub portlets: BTreeMap<String, PortletConfig>,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    /// Socket address to listen on
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Switches selecting between behaviors kept for older deployments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompatibilityFlags {
    /// A mapping error transform returns the packet itself instead of a new failure
    pub legacy_error_to_response: bool,
    /// Render with the plain-object renderer
    pub optimized_renderer: bool,
}

/// One independent mount point with its own mappings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PortletConfig {
    pub enabled: bool,
    pub context_path: String,
    pub api_path: String,
    /// Mapping source name to file location
    pub mapping_store: BTreeMap<String, String>,
    /// Option definitions: a header name, or `{headerName, optionName, required}`
    pub request_options: Map<String, Value>,
    pub response_options: Map<String, Value>,
    /// Milliseconds; absent or zero disables the deadline
    pub default_timeout: Option<u64>,
    pub user_agent_enabled: bool,
    pub service_resolver: String,
    pub error_codes: BTreeMap<String, ErrorCode>,
    /// Adds error stacks to failure bodies
    pub development_mode: bool,
    /// Handlers hand their pipeline result back to the caller instead of spawning it
    pub verbose: bool,
    pub compatibility: CompatibilityFlags,
}

impl Default for PortletConfig {
    fn default() -> Self {
        let mut response_options = Map::new();
        response_options.insert(
            "returnCode".to_string(),
            json!({ "headerName": DEFAULT_RETURN_CODE_HEADER }),
        );
        Self {
            enabled: true,
            context_path: DEFAULT_CONTEXT_PATH.to_string(),
            api_path: String::new(),
            mapping_store: BTreeMap::new(),
            request_options: Map::new(),
            response_options,
            default_timeout: None,
            user_agent_enabled: false,
            service_resolver: DEFAULT_SERVICE_RESOLVER.to_string(),
            error_codes: BTreeMap::new(),
            development_mode: false,
            verbose: false,
            compatibility: CompatibilityFlags::default(),
        }
    }
}

impl PortletConfig {
    /// `contextPath` joined with `apiPath`
    pub fn general_path(&self) -> String {
        join_path(&self.context_path, &self.api_path)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    fn validate_into(&self, name: &str, errors: &mut Vec<String>) {
        if !self.context_path.starts_with('/') {
            errors.push(format!("Portlet '{}': contextPath must start with '/'", name));
        }
        if !self.api_path.is_empty() && !self.api_path.starts_with('/') {
            errors.push(format!("Portlet '{}': apiPath must be empty or start with '/'", name));
        }
        if self.service_resolver.is_empty() {
            errors.push(format!("Portlet '{}': serviceResolver cannot be empty", name));
        }
        for (key, definition) in &self.request_options {
            match definition {
                Value::String(_) => {}
                Value::Object(fields) => {
                    if !fields.get("headerName").map_or(true, Value::is_string) {
                        errors.push(format!(
                            "Portlet '{}': requestOptions.{}.headerName must be a string",
                            name, key
                        ));
                    }
                }
                _ => errors.push(format!(
                    "Portlet '{}': requestOptions.{} must be a header name or an object",
                    name, key
                )),
            }
        }
        for (key, option) in &self.response_options {
            if !option.get("headerName").map_or(true, Value::is_string) {
                errors.push(format!(
                    "Portlet '{}': responseOptions.{}.headerName must be a string",
                    name, key
                ));
            }
        }
        for (code_name, code) in &self.error_codes {
            if let Some(status) = code.status_code {
                if !(100..=599).contains(&status) {
                    errors.push(format!(
                        "Portlet '{}': error code '{}' has invalid statusCode {}",
                        name, code_name, status
                    ));
                }
            }
        }
    }
}

impl RestfrontConfig {
    /// Load from a YAML (`.yaml`/`.yml`) or JSON (`.json`) file, then apply env overrides and validate
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

        let mut config: RestfrontConfig = if is_json {
            serde_json::from_str(&content)
                .map_err(|e| GatewayError::config(format!("Failed to parse JSON config: {}", e)))?
        } else {
            serde_yaml::from_str(&content)
                .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))?
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Portlets to start: the declared ones, or a single default portlet
    pub fn effective_portlets(&self) -> BTreeMap<String, PortletConfig> {
        if self.portlets.is_empty() {
            let mut portlets = BTreeMap::new();
            portlets.insert(DEFAULT_PORTLET.to_string(), PortletConfig::default());
            portlets
        } else {
            self.portlets.clone()
        }
    }

    /// Apply environment variable overrides
    ///
    /// `RESTFRONT_DEFAULT_TIMEOUT` and `RESTFRONT_DEVELOPMENT_MODE` apply to every portlet.
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        use std::env;

        if let Ok(address) = env::var("RESTFRONT_BIND_ADDRESS") {
            self.server.bind_address = address;
        }

        if let Ok(level) = env::var("RESTFRONT_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("RESTFRONT_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" | "pretty" => LogFormat::Text,
                other => {
                    return Err(GatewayError::config(format!(
                        "Invalid RESTFRONT_LOG_FORMAT: {}",
                        other
                    )))
                }
            };
        }

        if self.portlets.is_empty() {
            self.portlets = self.effective_portlets();
        }

        if let Ok(timeout) = env::var("RESTFRONT_DEFAULT_TIMEOUT") {
            let millis = parse_timeout_millis(&timeout)
                .map_err(|e| GatewayError::config(format!("Invalid RESTFRONT_DEFAULT_TIMEOUT: {}", e)))?;
            for portlet in self.portlets.values_mut() {
                portlet.default_timeout = Some(millis);
            }
        }

        if let Ok(enabled) = env::var("RESTFRONT_DEVELOPMENT_MODE") {
            let enabled: bool = enabled
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid RESTFRONT_DEVELOPMENT_MODE: {}", e)))?;
            for portlet in self.portlets.values_mut() {
                portlet.development_mode = enabled;
            }
        }

        Ok(())
    }

    /// Validate the whole configuration, reporting every problem in one error
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "bind_address '{}' is not a socket address",
                self.server.bind_address
            ));
        }

        let mut general_paths = HashSet::new();
        for (name, portlet) in &self.portlets {
            portlet.validate_into(name, &mut errors);
            if portlet.enabled && !general_paths.insert(portlet.general_path()) {
                errors.push(format!(
                    "Portlet '{}' shares its path '{}' with another portlet",
                    name,
                    portlet.general_path()
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )))
        }
    }
}

/// Milliseconds from either a bare number or a humantime duration (`"1500ms"`, `"2s"`)
fn parse_timeout_millis(value: &str) -> Result<u64, String> {
    if let Ok(millis) = value.trim().parse::<u64>() {
        return Ok(millis);
    }
    humantime::parse_duration(value.trim())
        .map(|duration| duration.as_millis() as u64)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_portlet_defaults() {
        let portlet = PortletConfig::default();
        assert_eq!(portlet.general_path(), "/restfront");
        assert_eq!(portlet.service_resolver, "app-opmaster/commander");
        assert_eq!(
            portlet.response_options["returnCode"]["headerName"],
            "X-Return-Code"
        );
        assert!(portlet.default_timeout().is_none());
    }

    #[test]
    fn test_camel_case_keys() {
        let yaml = r#"
portlets:
  default:
    contextPath: /example
    apiPath: /rest
    defaultTimeout: 1500
    userAgentEnabled: true
    requestOptions:
      requestId: X-Request-Id
      tenantId:
        headerName: X-Tenant-Id
        required: true
    compatibility:
      legacyErrorToResponse: true
"#;
        let config: RestfrontConfig = serde_yaml::from_str(yaml).unwrap();
        let portlet = &config.portlets["default"];
        assert_eq!(portlet.general_path(), "/example/rest");
        assert_eq!(portlet.default_timeout(), Some(Duration::from_millis(1500)));
        assert!(portlet.user_agent_enabled);
        assert!(portlet.compatibility.legacy_error_to_response);
        assert!(!portlet.compatibility.optimized_renderer);
        assert_eq!(portlet.request_options["tenantId"]["required"], true);
        assert_eq!(
            portlet.response_options["returnCode"]["headerName"],
            "X-Return-Code"
        );
    }

    #[tokio::test]
    async fn test_load_json_file() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"server": {{"bindAddress": "127.0.0.1:7979"}}, "portlets": {{"monitor": {{"contextPath": "/monitor"}}}}}}"#
        )
        .unwrap();
        let config = RestfrontConfig::load_from_file(file.path()).await.unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:7979");
        assert_eq!(config.portlets["monitor"].general_path(), "/monitor");
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = RestfrontConfig::default();
        config.server.bind_address = "nowhere".to_string();
        let mut broken = PortletConfig {
            context_path: "restfront".to_string(),
            ..Default::default()
        };
        broken
            .error_codes
            .insert("Weird".to_string(), ErrorCode::new("weird", 1, 999));
        config.portlets.insert("broken".to_string(), broken);

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("bind_address"));
        assert!(message.contains("contextPath must start with '/'"));
        assert!(message.contains("invalid statusCode 999"));
    }

    #[test]
    fn test_duplicate_general_paths_rejected() {
        let mut config = RestfrontConfig::default();
        config.portlets.insert("a".to_string(), PortletConfig::default());
        config.portlets.insert("b".to_string(), PortletConfig::default());
        assert!(config.validate().is_err());

        config.portlets.get_mut("b").unwrap().enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_overrides() {
        env::set_var("RESTFRONT_DEFAULT_TIMEOUT", "2s");
        env::set_var("RESTFRONT_LOG_FORMAT", "json");

        let mut config = RestfrontConfig::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.portlets["default"].default_timeout, Some(2000));
        assert_eq!(config.logging.format, LogFormat::Json);

        env::remove_var("RESTFRONT_DEFAULT_TIMEOUT");
        env::remove_var("RESTFRONT_LOG_FORMAT");
    }

    #[test]
    fn test_timeout_parsing() {
        assert_eq!(parse_timeout_millis("750"), Ok(750));
        assert_eq!(parse_timeout_millis("1500ms"), Ok(1500));
        assert!(parse_timeout_millis("soon").is_err());
    }
}
