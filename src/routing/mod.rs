//! HTTP routing of mapping pipelines.

pub mod router;

pub use router::{build_rest_router, mount, MAX_BODY_SIZE};
