//! # Portlet
//!
//! One independent mount point: its own general path, mapping sources, dispatch
//! table, error catalogs and routes. A process can run several portlets side by
//! side; nothing is shared between them except the service selector and the error
//! manager.

use axum::Router;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::config::PortletConfig;
use crate::core::error::GatewayResult;
use crate::core::error_catalog::{default_error_codes, ErrorCode, ErrorManager};
use crate::discovery::service_registry::ServiceSelector;
use crate::mapping::aggregator::{aggregate, DispatchTable};
use crate::mapping::loader::MappingLoader;
use crate::mapping::normalizer::{normalize, MappingHash, MappingSource};
use crate::middleware::pipeline::PipelineContext;
use crate::routing::router::{build_rest_router, mount};

pub struct Portlet {
    name: String,
    general_path: String,
    mapping_hash: MappingHash,
    dispatch_table: DispatchTable,
    context: PipelineContext,
}

impl Portlet {
    /// Load the portlet's mapping sources, then build it
    pub async fn load(
        name: &str,
        config: PortletConfig,
        loader: &MappingLoader,
        error_manager: Arc<dyn ErrorManager>,
        service_selector: Arc<dyn ServiceSelector>,
    ) -> GatewayResult<Self> {
        let sources = loader.load_mappings(&config.mapping_store).await?;
        Ok(Self::from_sources(name, config, sources, error_manager, service_selector))
    }

    /// Build from already loaded sources
    pub fn from_sources(
        name: &str,
        config: PortletConfig,
        sources: BTreeMap<String, MappingSource>,
        error_manager: Arc<dyn ErrorManager>,
        service_selector: Arc<dyn ServiceSelector>,
    ) -> Self {
        let general_path = config.general_path();
        let mapping_hash = normalize(sources);
        let dispatch_table = aggregate(&mapping_hash);

        register_source_errors(&mapping_hash, &config, error_manager.as_ref());
        let context = PipelineContext::new(name, Arc::new(config), error_manager, service_selector);

        info!(
            portlet = name,
            general_path = %general_path,
            sources = mapping_hash.len(),
            routes = dispatch_table.len(),
            "Portlet loaded"
        );

        Self {
            name: name.to_string(),
            general_path,
            mapping_hash,
            dispatch_table,
            context,
        }
    }

    /// Replace the pipeline collaborators (schema validator, tracelog, renderer)
    pub fn with_context<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(PipelineContext) -> PipelineContext,
    {
        self.context = configure(self.context);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PortletConfig {
        &self.context.portlet
    }

    pub fn general_path(&self) -> &str {
        &self.general_path
    }

    pub fn mapping_hash(&self) -> &MappingHash {
        &self.mapping_hash
    }

    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.dispatch_table
    }

    /// API docs of every source that declared some, with paths already prefixed
    pub fn api_docs(&self) -> Vec<Value> {
        self.mapping_hash
            .values()
            .filter_map(|source| source.api_docs.clone())
            .collect()
    }

    /// Routes of this portlet mounted at its general path
    pub fn router(&self) -> Router {
        mount(
            &self.general_path,
            build_rest_router(&self.context, &self.dispatch_table),
        )
    }
}

/// Register each source's route error codes under the source name, so a
/// mapping's `errorSource` resolves to a builder that knows them
fn register_source_errors(hash: &MappingHash, config: &PortletConfig, error_manager: &dyn ErrorManager) {
    for (source_name, source) in hash {
        let declared: BTreeMap<String, ErrorCode> = source
            .api_maps
            .values()
            .flat_map(|record| record.error_codes())
            .collect();
        if declared.is_empty() {
            continue;
        }
        let mut codes = default_error_codes();
        codes.extend(config.error_codes.clone());
        codes.extend(declared);
        debug!(source = %source_name, codes = codes.len(), "Registering mapping error codes");
        error_manager.register(source_name, &codes);
    }
}
