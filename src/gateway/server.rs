//! # HTTP Server Module
//!
//! Serves every enabled portlet from one axum application.
//!
//! ## Flow
//! 1. Each enabled [`PortletConfig`] becomes a [`Portlet`] (sources loaded, normalized
//!    and aggregated)
//! 2. The portlet routers are merged into one router wrapped in a `TraceLayer`
//! 3. `axum::serve` runs the router until Ctrl-C
//!
//! ## Rust Concepts Used
//! - `Arc<dyn Trait>` for the service selector and error manager shared by all portlets
//! - `tokio::net::TcpListener` for accepting connections
//! - Graceful shutdown through a future that resolves on Ctrl-C

use axum::Router;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::core::config::{PortletConfig, RestfrontConfig};
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::error_catalog::{ErrorManager, ErrorRegistry};
use crate::discovery::service_registry::ServiceSelector;
use crate::gateway::portlet::Portlet;
use crate::mapping::loader::MappingLoader;
use crate::mapping::normalizer::MappingSource;

/// The REST front: configuration, collaborators and per-portlet mapping loaders
pub struct RestfrontServer {
    config: RestfrontConfig,
    service_selector: Arc<dyn ServiceSelector>,
    error_manager: Arc<dyn ErrorManager>,
    loaders: BTreeMap<String, MappingLoader>,
}

impl RestfrontServer {
    pub fn new(config: RestfrontConfig, service_selector: Arc<dyn ServiceSelector>) -> Self {
        Self {
            config,
            service_selector,
            error_manager: Arc::new(ErrorRegistry::new()),
            loaders: BTreeMap::new(),
        }
    }

    pub fn with_error_manager(mut self, error_manager: Arc<dyn ErrorManager>) -> Self {
        self.error_manager = error_manager;
        self
    }

    /// Register a mapping source in code for one portlet
    pub fn register_mappings<P, S>(&mut self, portlet: P, source_name: S, source: MappingSource) -> &mut Self
    where
        P: Into<String>,
        S: Into<String>,
    {
        self.loaders
            .entry(portlet.into())
            .or_default()
            .register(source_name, source);
        self
    }

    pub fn config(&self) -> &RestfrontConfig {
        &self.config
    }

    /// Build every enabled portlet
    pub async fn portlets(&self) -> GatewayResult<Vec<Portlet>> {
        let configured = self.config.effective_portlets();
        let empty = MappingLoader::new();
        let mut portlets = Vec::new();
        for (name, portlet_config) in configured.clone() {
            if !portlet_config.enabled {
                info!(portlet = %name, "Portlet disabled, skipping");
                continue;
            }
            let loader = self.loaders.get(&name).unwrap_or(&empty);
            portlets.push(self.load_portlet(&name, portlet_config, loader).await?);
        }
        for name in self.loaders.keys() {
            if !configured.contains_key(name) {
                warn!(portlet = %name, "Mappings registered for an unknown portlet");
            }
        }
        Ok(portlets)
    }

    async fn load_portlet(
        &self,
        name: &str,
        config: PortletConfig,
        loader: &MappingLoader,
    ) -> GatewayResult<Portlet> {
        Portlet::load(
            name,
            config,
            loader,
            self.error_manager.clone(),
            self.service_selector.clone(),
        )
        .await
    }

    /// One router for all portlets
    pub async fn router(&self) -> GatewayResult<Router> {
        let router = self
            .portlets()
            .await?
            .iter()
            .fold(Router::new(), |router, portlet| router.merge(portlet.router()));
        Ok(router.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http())))
    }

    /// Serve until Ctrl-C
    pub async fn start(self) -> GatewayResult<()> {
        let app = self.router().await?;
        let bind_address = self.config.server.bind_address.clone();

        let listener = TcpListener::bind(&bind_address)
            .await
            .map_err(|e| GatewayError::internal(format!("Failed to bind to {}: {}", bind_address, e)))?;

        info!(address = %bind_address, "Restfront server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GatewayError::internal(format!("Server error: {}", e)))?;

        info!("Restfront server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C; shutting down");
    }
    info!("Shutdown signal received");
}
