//! # Mapping Module
//!
//! Declarative route mappings: how integrators describe routes, how sources are
//! normalized into canonical records, and how records from many sources are merged
//! into one dispatch table.

pub mod aggregator;
pub mod descriptor;
pub mod fields;
pub mod hooks;
pub mod loader;
pub mod normalizer;
pub mod result_filter;

pub use aggregator::{aggregate, aggregate_flat, DispatchTable};
pub use descriptor::{MappingRecord, RouteDescriptor, RoutePath, Section};
pub use hooks::{
    ErrorTransform, InletProcess, InputTransform, OutputTransform, PostValidator, PreValidator,
    Sample, Sanitizer, Services, StageContext, StaticSamples,
};
pub use loader::MappingLoader;
pub use normalizer::{normalize, upgrade_mapping, ApiMaps, MappingHash, MappingSource};
pub use result_filter::ResultFilter;
