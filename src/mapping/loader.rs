//! Mapping sources of one portlet, by name: declarative files named in its `mappingStore`,
//! or sources registered in code (which can carry hooks). A registered source
//! shadows a file source of the same name.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::core::error::{GatewayError, GatewayResult};
use crate::mapping::normalizer::MappingSource;

#[derive(Debug, Clone, Default)]
pub struct MappingLoader {
    registered: BTreeMap<String, MappingSource>,
}

impl MappingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source in code; it replaces any earlier registration under that name
    pub fn register<S: Into<String>>(&mut self, name: S, source: MappingSource) -> &mut Self {
        let name = name.into();
        debug!(source = %name, "Registered mapping source");
        self.registered.insert(name, source);
        self
    }

    pub fn registered(&self) -> &BTreeMap<String, MappingSource> {
        &self.registered
    }

    /// Every registered source plus the file sources of a `mappingStore`
    pub async fn load_mappings(
        &self,
        store: &BTreeMap<String, String>,
    ) -> GatewayResult<BTreeMap<String, MappingSource>> {
        let mut sources = self.registered.clone();
        for (name, location) in store {
            if sources.contains_key(name) {
                debug!(source = %name, "Registered source shadows mapping file");
                continue;
            }
            let source = load_source_file(name, location).await?;
            sources.insert(name.clone(), source);
        }
        info!(sources = sources.len(), "Loaded mapping sources");
        Ok(sources)
    }
}

/// Read one declarative source from YAML or JSON
pub async fn load_source_file<P: AsRef<Path>>(name: &str, path: P) -> GatewayResult<MappingSource> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        GatewayError::mapping(name, format!("cannot read {}: {}", path.display(), e))
    })?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_lowercase();

    let value: Value = match extension.as_str() {
        "json" => serde_json::from_str(&content)
            .map_err(|e| GatewayError::mapping(name, format!("invalid JSON: {}", e)))?,
        "yaml" | "yml" => serde_yaml::from_str(&content)
            .map_err(|e| GatewayError::mapping(name, format!("invalid YAML: {}", e)))?,
        other => {
            return Err(GatewayError::mapping(
                name,
                format!("unsupported mapping file extension '{}'", other),
            ))
        }
    };

    MappingSource::from_value(name, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::descriptor::RouteDescriptor;
    use crate::mapping::normalizer::ApiMaps;
    use serde_json::json;
    use std::io::Write;
    use tempfile::Builder;

    #[tokio::test]
    async fn test_loads_yaml_source() {
        let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "apiPath: /example\napiMaps:\n  - path: /fibonacci/calc/:number\n    method: GET\n    serviceName: application/example\n    methodName: fibonacci"
        )
        .unwrap();

        let mut store = BTreeMap::new();
        store.insert("example".to_string(), file.path().display().to_string());
        let sources = MappingLoader::new().load_mappings(&store).await.unwrap();

        let source = &sources["example"];
        assert_eq!(source.api_path.as_deref(), Some("/example"));
        match &source.api_maps {
            ApiMaps::List(routes) => assert_eq!(routes[0].attributes["methodName"], "fibonacci"),
            other => panic!("unexpected api maps: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_registered_source_shadows_file() {
        let mut loader = MappingLoader::new();
        loader.register(
            "example",
            MappingSource::routes(vec![RouteDescriptor::new(json!({"path": "/code"}))]),
        );
        let mut store = BTreeMap::new();
        store.insert("example".to_string(), "/does/not/exist.json".to_string());

        let sources = loader.load_mappings(&store).await.unwrap();
        assert_eq!(
            sources["example"].api_maps,
            ApiMaps::List(vec![RouteDescriptor::new(json!({"path": "/code"}))])
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_mapping_error() {
        let mut store = BTreeMap::new();
        store.insert("ghost".to_string(), "/does/not/exist.yaml".to_string());
        let err = MappingLoader::new().load_mappings(&store).await.unwrap_err();
        assert_eq!(err.error_type(), "MappingError");
        assert!(err.to_string().contains("ghost"));
    }
}
