//! # Mapping Aggregator
//!
//! Combines normalized sources into the dispatch table a portlet routes from.
//! Routes landing on the same path are deep-merged: arrays are unioned, `path` is
//! replaced by the later route, hooks from the later route win. Every entry is
//! tagged with the name of the first source that contributed to it (`errorSource`)
//! unless a route declared one itself.

use std::collections::BTreeMap;
use tracing::debug;

use crate::mapping::descriptor::MappingRecord;
use crate::mapping::fields::merge_with_union;
use crate::mapping::normalizer::MappingHash;

/// Canonical mappings keyed by route path
pub type DispatchTable = BTreeMap<String, MappingRecord>;

/// Build the dispatch table with the path-keyed merge strategy
pub fn aggregate(hash: &MappingHash) -> DispatchTable {
    let mut table = DispatchTable::new();
    for (source_name, source) in hash {
        for (key, route) in &source.api_maps {
            let mut paths = route.path().paths();
            if paths.is_empty() {
                paths.push(key.clone());
            }
            for path in paths {
                let entry = table.entry(path).or_default();
                merge_record(entry, route);
                if entry.error_source().is_none() {
                    entry.set_error_source(source_name);
                }
            }
        }
    }
    debug!(entries = table.len(), sources = hash.len(), "Aggregated dispatch table");
    table
}

/// Flat concatenation of every route of every source, in source order.
///
/// Routes sharing a path are kept as separate entries; only safe when sources never overlap.
pub fn aggregate_flat(hash: &MappingHash) -> Vec<MappingRecord> {
    hash.iter()
        .flat_map(|(source_name, source)| {
            source.api_maps.values().map(move |route| {
                let mut record = route.clone();
                if record.error_source().is_none() {
                    record.set_error_source(source_name);
                }
                record
            })
        })
        .collect()
}

fn merge_record(target: &mut MappingRecord, incoming: &MappingRecord) {
    merge_with_union(&mut target.attributes, &incoming.attributes);
    target.hooks.merge(&incoming.hooks);
}
