//! Collaborators the pipeline resolves at build time: backend service methods and request ids.

pub mod service_registry;
pub mod tracelog;

pub use service_registry::{MethodRef, ServiceMethod, ServiceRegistry, ServiceSelector};
pub use tracelog::{HeaderTracelog, TracelogService};
