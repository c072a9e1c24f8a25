//! # Mapping Normalizer
//!
//! Turns named [`MappingSource`]s into canonical [`NormalizedSource`]s:
//!
//! - resolves `apiMaps` from `apiMaps`, `apimaps` or a bare route list
//! - prefixes list-form route paths with the source `apiPath`
//! - keys list-form routes by their first path (`"error"` when a route has none)
//! - upgrades every route to a [`MappingRecord`]
//! - prefixes the `paths` keys of the source API docs with `apiPath`

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::core::error::{GatewayError, GatewayResult};
use crate::mapping::descriptor::{MappingRecord, RouteDescriptor, Section, StageHooks};
use crate::mapping::fields::join_path;

/// Key given to list-form routes that declare no string path
pub const UNKEYED_ROUTE: &str = "error";

/// Routes of a mapping source, as a list or keyed by path
#[derive(Debug, Clone, PartialEq)]
pub enum ApiMaps {
    List(Vec<RouteDescriptor>),
    Keyed(Vec<(String, RouteDescriptor)>),
}

impl Default for ApiMaps {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

/// One named bundle of route descriptors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingSource {
    pub api_path: Option<String>,
    pub api_maps: ApiMaps,
    pub api_docs: Option<Value>,
}

impl MappingSource {
    pub fn routes(routes: Vec<RouteDescriptor>) -> Self {
        Self {
            api_maps: ApiMaps::List(routes),
            ..Default::default()
        }
    }

    pub fn keyed(routes: Vec<(String, RouteDescriptor)>) -> Self {
        Self {
            api_maps: ApiMaps::Keyed(routes),
            ..Default::default()
        }
    }

    pub fn with_api_path<S: Into<String>>(mut self, api_path: S) -> Self {
        self.api_path = Some(api_path.into());
        self
    }

    pub fn with_api_docs(mut self, api_docs: Value) -> Self {
        self.api_docs = Some(api_docs);
        self
    }

    /// Read a declarative source: a bare route list, or an object with
    /// `apiPath`, `apiMaps`/`apimaps` and `apiDocs`/`swagger`
    pub fn from_value(source_name: &str, value: Value) -> GatewayResult<Self> {
        match value {
            Value::Array(routes) => Ok(Self::routes(
                routes.into_iter().map(RouteDescriptor::new).collect(),
            )),
            Value::Object(mut object) => {
                let api_path = object
                    .get("apiPath")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let api_maps = match object.remove("apiMaps").or_else(|| object.remove("apimaps")) {
                    None | Some(Value::Null) => ApiMaps::default(),
                    Some(Value::Array(routes)) => {
                        ApiMaps::List(routes.into_iter().map(RouteDescriptor::new).collect())
                    }
                    Some(Value::Object(routes)) => ApiMaps::Keyed(
                        routes
                            .into_iter()
                            .map(|(key, route)| (key, RouteDescriptor::new(route)))
                            .collect(),
                    ),
                    Some(other) => {
                        return Err(GatewayError::mapping(
                            source_name,
                            format!("apiMaps must be a list or an object, got {}", other),
                        ))
                    }
                };
                let api_docs = object.remove("apiDocs").or_else(|| object.remove("swagger"));
                Ok(Self {
                    api_path,
                    api_maps,
                    api_docs,
                })
            }
            other => Err(GatewayError::mapping(
                source_name,
                format!("a mapping source must be a list or an object, got {}", other),
            )),
        }
    }

    fn effective_api_path(&self) -> Option<&str> {
        self.api_path.as_deref().filter(|path| !path.is_empty())
    }
}

/// A source after normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedSource {
    pub api_maps: BTreeMap<String, MappingRecord>,
    pub api_docs: Option<Value>,
}

/// Normalized sources by name
pub type MappingHash = BTreeMap<String, NormalizedSource>;

/// Normalize every source of a mapping set
pub fn normalize(sources: BTreeMap<String, MappingSource>) -> MappingHash {
    sources
        .into_iter()
        .map(|(name, source)| {
            let normalized = normalize_source(&name, source);
            debug!(source = %name, routes = normalized.api_maps.len(), "Normalized mapping source");
            (name, normalized)
        })
        .collect()
}

fn normalize_source(source_name: &str, source: MappingSource) -> NormalizedSource {
    let api_path = source.effective_api_path().map(str::to_string);

    let api_maps = match source.api_maps {
        ApiMaps::List(routes) => {
            let mut keyed = BTreeMap::new();
            for mut route in routes {
                if let Some(api_path) = &api_path {
                    let prefixed = route.path().map(|path| join_path(api_path, path));
                    route.set_path(prefixed);
                }
                let key = route
                    .path()
                    .first()
                    .map(str::to_string)
                    .unwrap_or_else(|| UNKEYED_ROUTE.to_string());
                if keyed.contains_key(&key) {
                    warn!(source = source_name, path = %key, "Route replaces an earlier route with the same path");
                }
                keyed.insert(key, upgrade_mapping(route));
            }
            keyed
        }
        ApiMaps::Keyed(routes) => routes
            .into_iter()
            .map(|(key, route)| (key, upgrade_mapping(route)))
            .collect(),
    };

    let api_docs = source
        .api_docs
        .map(|docs| prefix_api_docs(docs, api_path.as_deref()));

    NormalizedSource { api_maps, api_docs }
}

fn prefix_api_docs(mut docs: Value, api_path: Option<&str>) -> Value {
    let Some(api_path) = api_path else {
        return docs;
    };
    if let Some(Value::Object(paths)) = docs.get_mut("paths") {
        let prefixed: Map<String, Value> = std::mem::take(paths)
            .into_iter()
            .map(|(key, entry)| (join_path(api_path, &key), entry))
            .collect();
        *paths = prefixed;
    }
    docs
}

/// Attribute names that can only ever hold hooks
fn hook_attributes(section: Section) -> &'static [&'static str] {
    match section {
        Section::Input => &["transform", "preValidator", "postValidator"],
        Section::Output => &["transform", "sanitize"],
        Section::Error => &["transform"],
    }
}

const LEGACY_ATTRIBUTES: [&str; 3] = ["transformRequest", "transformResponse", "transformError"];

/// Bring a route into canonical shape. Applying it to its own output changes nothing.
pub fn upgrade_mapping(descriptor: RouteDescriptor) -> MappingRecord {
    let RouteDescriptor {
        mut attributes,
        hooks,
    } = descriptor;

    for section in [Section::Input, Section::Output, Section::Error] {
        let entry = attributes
            .entry(section.key().to_string())
            .or_insert_with(|| json!({}));
        if !entry.is_object() {
            *entry = json!({});
        }
        if let Value::Object(object) = entry {
            // declarative attributes are never callable
            for hook in hook_attributes(section) {
                object.remove(*hook);
            }
            let mutate = object.entry("mutate").or_insert_with(|| json!({}));
            if mutate.is_null() {
                *mutate = json!({});
            }
        }
    }

    let inlet = attributes
        .entry("inlet".to_string())
        .or_insert_with(|| json!({}));
    if !inlet.is_object() {
        *inlet = json!({});
    }
    if let Value::Object(inlet) = inlet {
        inlet.remove("process");
    }

    for legacy in LEGACY_ATTRIBUTES {
        attributes.remove(legacy);
    }

    MappingRecord {
        attributes,
        hooks: StageHooks {
            input_transform: hooks.input_transform.or(hooks.transform_request),
            pre_validator: hooks.pre_validator,
            post_validator: hooks.post_validator,
            inlet_process: hooks.inlet_process,
            output_transform: hooks.output_transform.or(hooks.transform_response),
            sanitize: hooks.sanitize,
            error_transform: hooks.error_transform.or(hooks.transform_error),
            sample: hooks.sample,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::hooks::{InputTransform, OutputTransform};

    #[test]
    #[allow(deprecated)]
    fn test_upgrade_migrates_legacy_hooks() {
        let legacy = OutputTransform::new(|result, _ctx| async move { Ok(result) });
        let route = RouteDescriptor::new(json!({
            "path": "/fibonacci/calc/:number",
            "method": "GET",
            "transformResponse": "not callable",
            "output": {"transform": "also not callable"}
        }))
        .with_transform_response(legacy.clone());

        let record = upgrade_mapping(route);
        assert_eq!(record.hooks().output_transform.as_ref(), Some(&legacy));
        assert!(record.get("transformResponse").is_none());
        assert_eq!(record.get("output"), Some(&json!({"mutate": {}})));
        assert_eq!(record.get("input"), Some(&json!({"mutate": {}})));
        assert_eq!(record.get("error"), Some(&json!({"mutate": {}})));
        assert_eq!(record.get("inlet"), Some(&json!({})));
    }

    #[test]
    #[allow(deprecated)]
    fn test_canonical_hook_beats_legacy_alias() {
        let canonical = InputTransform::new(|_ctx| async move { Ok(json!(1)) });
        let legacy = InputTransform::new(|_ctx| async move { Ok(json!(2)) });
        let record = upgrade_mapping(
            RouteDescriptor::new(json!({"path": "/x"}))
                .with_input_transform(canonical.clone())
                .with_transform_request(legacy),
        );
        assert_eq!(record.hooks().input_transform, Some(canonical));
    }

    #[test]
    fn test_upgrade_is_idempotent() {
        let transform = InputTransform::new(|ctx| async move { Ok(ctx.request.body.clone()) });
        let route = RouteDescriptor::new(json!({
            "path": ["/a", "/b"],
            "input": {"mutate": {"rename": {"a": "b"}}},
            "output": null,
            "inlet": {"process": true}
        }))
        .with_input_transform(transform);

        let once = upgrade_mapping(route);
        let twice = upgrade_mapping(RouteDescriptor::from(once.clone()));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_api_path_prefixes_list_routes() {
        let source = MappingSource::routes(vec![
            RouteDescriptor::new(json!({"path": "/:v/x"})),
            RouteDescriptor::new(json!({"path": ["/a", "b/"]})),
            RouteDescriptor::new(json!({"method": "GET"})),
        ])
        .with_api_path("/sub");

        let mut sources = BTreeMap::new();
        sources.insert("example".to_string(), source);
        let hash = normalize(sources);
        let maps = &hash["example"].api_maps;

        assert_eq!(maps["/sub/:v/x"].get("path"), Some(&json!("/sub/:v/x")));
        assert_eq!(maps["/sub/a"].get("path"), Some(&json!(["/sub/a", "/sub/b/"])));
        assert!(maps.contains_key(UNKEYED_ROUTE));
    }

    #[test]
    fn test_keyed_routes_keep_keys_and_paths() {
        let value = json!({
            "apiPath": "/sub",
            "apimaps": {"/plain": {"path": "/plain", "method": "GET"}}
        });
        let source = MappingSource::from_value("example", value).unwrap();
        let mut sources = BTreeMap::new();
        sources.insert("example".to_string(), source);
        let hash = normalize(sources);
        assert_eq!(hash["example"].api_maps["/plain"].get("path"), Some(&json!("/plain")));
    }

    #[test]
    fn test_api_docs_paths_are_prefixed() {
        let value = json!({
            "apiPath": "/example",
            "apiMaps": [],
            "swagger": {"paths": {"/fibonacci/{number}": {"get": {}}}}
        });
        let mut sources = BTreeMap::new();
        sources.insert(
            "example".to_string(),
            MappingSource::from_value("example", value).unwrap(),
        );
        let docs = normalize(sources)["example"].api_docs.clone().unwrap();
        assert!(docs["paths"].get("/example/fibonacci/{number}").is_some());
    }

    #[test]
    fn test_from_value_rejects_scalars() {
        let err = MappingSource::from_value("broken", json!(42)).unwrap_err();
        assert_eq!(err.error_type(), "MappingError");
    }
}
