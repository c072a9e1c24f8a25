// Structured logging
pub mod logging;

// Request counters and latency
pub mod metrics;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::RequestTimer;
