//! # Route Descriptors
//!
//! A [`RouteDescriptor`] is a route as an integrator wrote it: declarative JSON
//! attributes plus whatever hooks were registered in code, legacy aliases included.
//! A [`MappingRecord`] is the canonical form produced by
//! [`crate::mapping::normalizer::upgrade_mapping`]:
//!
//! - `input`, `output` and `error` are always objects carrying a `mutate` object
//! - `inlet` is always an object
//! - legacy `transformRequest`/`transformResponse`/`transformError` are gone
//! - hook slots are either empty or hold a callable
//!
//! Everything the pipeline needs is read through typed accessors on the record.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::core::error_catalog::ErrorCode;
use crate::mapping::hooks::{
    ErrorTransform, InletProcess, InputTransform, OutputTransform, PostValidator, PreValidator,
    Sample, Sanitizer,
};

/// Hooks as registered on a raw descriptor, deprecated aliases included
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteHooks {
    pub input_transform: Option<InputTransform>,
    pub pre_validator: Option<PreValidator>,
    pub post_validator: Option<PostValidator>,
    pub inlet_process: Option<InletProcess>,
    pub output_transform: Option<OutputTransform>,
    pub sanitize: Option<Sanitizer>,
    pub error_transform: Option<ErrorTransform>,
    pub sample: Option<Sample>,

    /// Deprecated alias of `input_transform`
    pub transform_request: Option<InputTransform>,
    /// Deprecated alias of `output_transform`
    pub transform_response: Option<OutputTransform>,
    /// Deprecated alias of `error_transform`
    pub transform_error: Option<ErrorTransform>,
}

/// Canonical hook slots of a normalized mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageHooks {
    pub input_transform: Option<InputTransform>,
    pub pre_validator: Option<PreValidator>,
    pub post_validator: Option<PostValidator>,
    pub inlet_process: Option<InletProcess>,
    pub output_transform: Option<OutputTransform>,
    pub sanitize: Option<Sanitizer>,
    pub error_transform: Option<ErrorTransform>,
    pub sample: Option<Sample>,
}

impl StageHooks {
    /// Incoming hooks win slot by slot
    pub fn merge(&mut self, incoming: &StageHooks) {
        macro_rules! take {
            ($($slot:ident),*) => {
                $(if incoming.$slot.is_some() {
                    self.$slot = incoming.$slot.clone();
                })*
            };
        }
        take!(
            input_transform,
            pre_validator,
            post_validator,
            inlet_process,
            output_transform,
            sanitize,
            error_transform,
            sample
        );
    }
}

/// One of the three staged sections of a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Input,
    Output,
    Error,
}

impl Section {
    pub fn key(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Error => "error",
        }
    }
}

/// The `path` attribute: absent, one path or several
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePath {
    None,
    One(String),
    Many(Vec<String>),
}

impl RoutePath {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(path)) => Self::One(path.clone()),
            Some(Value::Array(items)) => Self::Many(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            _ => Self::None,
        }
    }

    pub fn paths(&self) -> Vec<String> {
        match self {
            Self::None => Vec::new(),
            Self::One(path) => vec![path.clone()],
            Self::Many(paths) => paths.clone(),
        }
    }

    /// First string path, used as the key of keyed mapping tables
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::One(path) => Some(path),
            Self::Many(paths) => paths.first().map(String::as_str),
        }
    }

    /// Apply `f` to every path, keeping the string/array shape
    pub fn map<F: Fn(&str) -> String>(&self, f: F) -> Self {
        match self {
            Self::None => Self::None,
            Self::One(path) => Self::One(f(path)),
            Self::Many(paths) => Self::Many(paths.iter().map(|path| f(path)).collect()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::None => Value::Null,
            Self::One(path) => Value::String(path.clone()),
            Self::Many(paths) => Value::Array(paths.iter().cloned().map(Value::String).collect()),
        }
    }
}

/// A route as supplied by an integrator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteDescriptor {
    pub attributes: Map<String, Value>,
    pub hooks: RouteHooks,
}

impl RouteDescriptor {
    /// Descriptor from declarative attributes; anything but an object yields an empty route
    pub fn new(attributes: Value) -> Self {
        Self {
            attributes: match attributes {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            hooks: RouteHooks::default(),
        }
    }

    pub fn path(&self) -> RoutePath {
        RoutePath::from_value(self.attributes.get("path"))
    }

    pub fn set_path(&mut self, path: RoutePath) {
        match path {
            RoutePath::None => {
                self.attributes.remove("path");
            }
            path => {
                self.attributes.insert("path".to_string(), path.to_value());
            }
        }
    }

    pub fn with_input_transform(mut self, hook: InputTransform) -> Self {
        self.hooks.input_transform = Some(hook);
        self
    }

    pub fn with_pre_validator(mut self, hook: PreValidator) -> Self {
        self.hooks.pre_validator = Some(hook);
        self
    }

    pub fn with_post_validator(mut self, hook: PostValidator) -> Self {
        self.hooks.post_validator = Some(hook);
        self
    }

    pub fn with_inlet(mut self, hook: InletProcess) -> Self {
        self.hooks.inlet_process = Some(hook);
        self
    }

    pub fn with_output_transform(mut self, hook: OutputTransform) -> Self {
        self.hooks.output_transform = Some(hook);
        self
    }

    pub fn with_sanitizer(mut self, hook: Sanitizer) -> Self {
        self.hooks.sanitize = Some(hook);
        self
    }

    pub fn with_error_transform(mut self, hook: ErrorTransform) -> Self {
        self.hooks.error_transform = Some(hook);
        self
    }

    pub fn with_sample(mut self, sample: Sample) -> Self {
        self.hooks.sample = Some(sample);
        self
    }

    #[deprecated(note = "use with_input_transform")]
    pub fn with_transform_request(mut self, hook: InputTransform) -> Self {
        self.hooks.transform_request = Some(hook);
        self
    }

    #[deprecated(note = "use with_output_transform")]
    pub fn with_transform_response(mut self, hook: OutputTransform) -> Self {
        self.hooks.transform_response = Some(hook);
        self
    }

    #[deprecated(note = "use with_error_transform")]
    pub fn with_transform_error(mut self, hook: ErrorTransform) -> Self {
        self.hooks.transform_error = Some(hook);
        self
    }
}

/// A normalized route
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingRecord {
    pub(crate) attributes: Map<String, Value>,
    pub(crate) hooks: StageHooks,
}

impl MappingRecord {
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn hooks(&self) -> &StageHooks {
        &self.hooks
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn path(&self) -> RoutePath {
        RoutePath::from_value(self.attributes.get("path"))
    }

    /// Declared HTTP methods, upper-cased; `None` when the route declares none
    pub fn methods(&self) -> Option<Vec<String>> {
        match self.attributes.get("method")? {
            Value::String(method) => Some(vec![method.to_uppercase()]),
            Value::Array(methods) => Some(
                methods
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_uppercase)
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Whether this mapping serves `method`; a route without methods serves nothing
    pub fn accepts_method(&self, method: &str) -> bool {
        self.methods()
            .map(|methods| methods.iter().any(|m| m.eq_ignore_ascii_case(method)))
            .unwrap_or(false)
    }

    fn str_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn service_name(&self) -> Option<&str> {
        self.str_attribute("serviceName")
    }

    pub fn method_name(&self) -> Option<&str> {
        self.str_attribute("methodName")
    }

    pub fn service_resolver(&self) -> Option<&str> {
        self.str_attribute("serviceResolver")
    }

    pub fn error_source(&self) -> Option<&str> {
        self.str_attribute("errorSource")
    }

    pub(crate) fn set_error_source(&mut self, source_name: &str) {
        self.attributes
            .insert("errorSource".to_string(), Value::String(source_name.to_string()));
    }

    /// Route timeout in milliseconds
    pub fn timeout(&self) -> Option<u64> {
        self.attributes.get("timeout").and_then(Value::as_u64)
    }

    pub fn request_options(&self) -> Option<&Map<String, Value>> {
        self.attributes.get("requestOptions").and_then(Value::as_object)
    }

    pub fn response_options(&self) -> Option<&Map<String, Value>> {
        self.attributes.get("responseOptions").and_then(Value::as_object)
    }

    /// Route-group error codes; malformed entries are skipped
    pub fn error_codes(&self) -> BTreeMap<String, ErrorCode> {
        self.attributes
            .get("errorCodes")
            .and_then(Value::as_object)
            .map(|codes| {
                codes
                    .iter()
                    .filter_map(|(name, code)| {
                        serde_json::from_value::<ErrorCode>(code.clone())
                            .ok()
                            .map(|code| (name.clone(), code))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn validator_schema(&self) -> Option<&Value> {
        self.attributes
            .get("validatorSchema")
            .filter(|schema| schema.is_object())
    }

    fn section(&self, section: Section) -> Option<&Map<String, Value>> {
        self.attributes.get(section.key()).and_then(Value::as_object)
    }

    /// `enabled !== false`
    pub fn enabled(&self, section: Section) -> bool {
        self.section(section)
            .and_then(|s| s.get("enabled"))
            .map_or(true, |enabled| enabled != &Value::Bool(false))
    }

    /// `<section>.mutate.rename`
    pub fn renames(&self, section: Section) -> Option<&Map<String, Value>> {
        self.section(section)?
            .get("mutate")?
            .get("rename")?
            .as_object()
    }

    /// `output.mutate.except`
    pub fn output_except(&self) -> Option<Vec<String>> {
        let except = self.section(Section::Output)?.get("mutate")?.get("except")?;
        match except {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            Value::String(path) => Some(vec![path.clone()]),
            _ => None,
        }
    }
}

impl From<MappingRecord> for RouteDescriptor {
    fn from(record: MappingRecord) -> Self {
        let StageHooks {
            input_transform,
            pre_validator,
            post_validator,
            inlet_process,
            output_transform,
            sanitize,
            error_transform,
            sample,
        } = record.hooks;
        Self {
            attributes: record.attributes,
            hooks: RouteHooks {
                input_transform,
                pre_validator,
                post_validator,
                inlet_process,
                output_transform,
                sanitize,
                error_transform,
                sample,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(attributes: Value) -> MappingRecord {
        MappingRecord {
            attributes: attributes.as_object().cloned().unwrap_or_default(),
            hooks: StageHooks::default(),
        }
    }

    #[test]
    fn test_route_path_shapes() {
        assert_eq!(RoutePath::from_value(Some(&json!("/a"))).paths(), vec!["/a"]);
        assert_eq!(
            RoutePath::from_value(Some(&json!(["/a", "/b"]))).first(),
            Some("/a")
        );
        assert_eq!(RoutePath::from_value(Some(&json!(12))), RoutePath::None);
        assert_eq!(
            RoutePath::Many(vec!["/a".into()]).map(|p| format!("/x{}", p)).to_value(),
            json!(["/x/a"])
        );
    }

    #[test]
    fn test_method_matching_is_case_insensitive() {
        let mapping = record(json!({"method": ["get", "Post"]}));
        assert!(mapping.accepts_method("GET"));
        assert!(mapping.accepts_method("post"));
        assert!(!mapping.accepts_method("DELETE"));
        assert!(!record(json!({})).accepts_method("GET"));
    }

    #[test]
    fn test_section_accessors() {
        let mapping = record(json!({
            "input": {"enabled": false, "mutate": {"rename": {"a": "b"}}},
            "output": {"mutate": {"except": ["_id", "author._id"]}},
            "error": {"mutate": {}},
            "errorCodes": {"MaximumExceeding": {"message": "Too big", "returnCode": 2002, "statusCode": 500}}
        }));
        assert!(!mapping.enabled(Section::Input));
        assert!(mapping.enabled(Section::Output));
        assert_eq!(mapping.renames(Section::Input).unwrap()["a"], "b");
        assert!(mapping.renames(Section::Error).is_none());
        assert_eq!(mapping.output_except().unwrap(), vec!["_id", "author._id"]);
        assert_eq!(
            mapping.error_codes()["MaximumExceeding"].status_code,
            Some(500)
        );
    }
}
