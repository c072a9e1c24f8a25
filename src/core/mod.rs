//! Core types shared by every layer: configuration, errors, request/response types.

pub mod config;
pub mod error;
pub mod error_catalog;
pub mod failure;
pub mod types;

pub use config::{CompatibilityFlags, PortletConfig, RestfrontConfig, ServerSettings};
pub use error::{GatewayError, GatewayResult};
pub use error_catalog::{ErrorBuilder, ErrorCatalog, ErrorCode, ErrorManager, ErrorOptions, ErrorRegistry};
pub use failure::{ErrorValue, Failure};
pub use types::{Packet, RenderedResponse, ResponseBuffer, ResponseWriter, RestRequest};
