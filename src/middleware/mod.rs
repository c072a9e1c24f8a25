//! # Middleware Module
//!
//! The per-mapping request pipeline and the pieces it is assembled from.

pub mod error_packet;
pub mod options;
pub mod pipeline;
pub mod render;
pub mod request_logging;
pub mod timeout;
pub mod user_agent;
pub mod validator;

pub use error_packet::{ErrorPacketBuilder, ErrorPolicy};
pub use options::{extract_request_options, ExtractSettings, RequestOptions};
pub use pipeline::{Next, Pipeline, PipelineContext, PipelineOutcome, StagePlan};
pub use render::{OptimizedRenderer, PacketRenderer, StandardRenderer};
pub use request_logging::RequestLog;
pub use timeout::TimeoutPolicy;
pub use validator::{BasicSchemaValidator, SchemaCheck, SchemaValidator};
