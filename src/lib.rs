//! # Restfront - Declarative REST Front Library
//!
//! Exposes backend service methods as HTTP routes described by declarative mappings.
//! A mapping binds a path and method to a service method, together with optional
//! input/output transforms, validators, renames and an error policy. Each mapping is
//! compiled once into a pipeline; every request walks that pipeline and ends as
//! exactly one rendered response.
//!
//! ## Layout
//! - `mapping`: route descriptors, normalization and the per-portlet dispatch table
//! - `middleware`: the request pipeline (options, validation, transforms, errors, rendering)
//! - `routing`: the axum router built from a dispatch table
//! - `gateway`: portlets and the HTTP server
//! - `discovery`: service method lookup and request ids
//! - `observability`: logging and metrics
//!
//! ## Example
//! ```no_run
//! use restfront::{RestfrontConfig, RestfrontServer, ServiceRegistry};
//! use std::sync::Arc;
//!
//! # async fn run() -> restfront::GatewayResult<()> {
//! let services = Arc::new(ServiceRegistry::new());
//! let config = RestfrontConfig::load_from_file("config/restfront.yaml").await?;
//! RestfrontServer::new(config, services).start().await
//! # }
//! ```

/// Configuration, error types, failures and request/response types
pub mod core;

/// Backend service method lookup and request-id resolution
pub mod discovery;

/// Portlets and the server that hosts them
pub mod gateway;

/// Mapping descriptors, normalization, aggregation and hooks
pub mod mapping;

/// Per-mapping request pipeline
pub mod middleware;

/// Structured logging and request metrics
pub mod observability;

/// axum routers built from dispatch tables
pub mod routing;

pub use core::config::{PortletConfig, RestfrontConfig};
pub use core::error::{GatewayError, GatewayResult};
pub use core::failure::{ErrorValue, Failure};
pub use core::types::{Packet, ResponseBuffer, ResponseWriter, RestRequest};
pub use discovery::service_registry::ServiceRegistry;
pub use gateway::{Portlet, RestfrontServer};
pub use mapping::{MappingSource, RouteDescriptor};
pub use middleware::pipeline::{Pipeline, PipelineContext, PipelineOutcome};
