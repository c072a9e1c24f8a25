//! Dotted-path helpers over `serde_json::Value`.
//!
//! Mapping descriptors address fields with paths like `author._id` or
//! `comments[0].id`; renaming, exclusion and option extraction all go through here.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let mut rest = part;
        if let Some(open) = rest.find('[') {
            if open > 0 {
                segments.push(Segment::Key(rest[..open].to_string()));
            }
            rest = &rest[open..];
            while let Some(stripped) = rest.strip_prefix('[') {
                match stripped.find(']') {
                    Some(close) => {
                        let inner = &stripped[..close];
                        match inner.parse::<usize>() {
                            Ok(index) => segments.push(Segment::Index(index)),
                            Err(_) => segments.push(Segment::Key(inner.trim_matches('"').to_string())),
                        }
                        rest = &stripped[close + 1..];
                    }
                    None => {
                        segments.push(Segment::Key(rest.to_string()));
                        rest = "";
                    }
                }
            }
            if !rest.is_empty() {
                segments.push(Segment::Key(rest.to_string()));
            }
        } else if !rest.is_empty() {
            segments.push(Segment::Key(rest.to_string()));
        }
    }
    segments
}

fn child<'a>(value: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match (value, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get(key),
        (Value::Object(map), Segment::Index(index)) => map.get(&index.to_string()),
        (Value::Array(items), Segment::Index(index)) => items.get(*index),
        _ => None,
    }
}

/// Read the value at a dotted path
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    parse_path(path)
        .iter()
        .try_fold(value, |current, segment| child(current, segment))
}

/// Write a value at a dotted path, creating intermediate objects as needed
pub fn set_path(target: &mut Value, path: &str, value: Value) {
    let segments = parse_path(path);
    if segments.is_empty() {
        return;
    }
    let mut current = target;
    for (position, segment) in segments.iter().enumerate() {
        let last = position + 1 == segments.len();
        current = match (segment, current) {
            (Segment::Index(index), Value::Array(items)) => {
                while items.len() <= *index {
                    items.push(Value::Null);
                }
                &mut items[*index]
            }
            (segment, slot) => {
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                let key = match segment {
                    Segment::Key(key) => key.clone(),
                    Segment::Index(index) => index.to_string(),
                };
                match slot {
                    Value::Object(map) => map.entry(key).or_insert(Value::Null),
                    _ => return,
                }
            }
        };
        if last {
            *current = value;
            return;
        }
    }
}

/// Remove the value at a dotted path, returning it when it existed
pub fn unset_path(target: &mut Value, path: &str) -> Option<Value> {
    let segments = parse_path(path);
    let (last, parents) = segments.split_last()?;
    let mut current = target;
    for segment in parents {
        current = match (current, segment) {
            (Value::Object(map), Segment::Key(key)) => map.get_mut(key)?,
            (Value::Object(map), Segment::Index(index)) => map.get_mut(&index.to_string())?,
            (Value::Array(items), Segment::Index(index)) => items.get_mut(*index)?,
            _ => return None,
        };
    }
    match (current, last) {
        (Value::Object(map), Segment::Key(key)) => map.remove(key),
        (Value::Object(map), Segment::Index(index)) => map.remove(&index.to_string()),
        // array slots keep their position
        (Value::Array(items), Segment::Index(index)) => items
            .get_mut(*index)
            .map(|slot| std::mem::replace(slot, Value::Null)),
        _ => None,
    }
}

/// Move fields from old paths to new paths; a missing source field is skipped
pub fn rename_fields(mut data: Value, renames: &Map<String, Value>) -> Value {
    if !data.is_object() {
        return data;
    }
    for (from, to) in renames {
        let Some(to) = to.as_str() else { continue };
        if from == to {
            continue;
        }
        if let Some(value) = unset_path(&mut data, from) {
            set_path(&mut data, to, value);
        }
    }
    data
}

/// Copy of `data` without the listed paths
pub fn omit_paths(data: &Value, paths: &[String]) -> Value {
    let mut result = data.clone();
    for path in paths {
        unset_path(&mut result, path);
    }
    result
}

/// Recursive merge: objects merge key by key, everything else is overwritten
pub fn deep_merge(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

/// Merge used when mapping sources collide on a path: arrays are unioned, the
/// `path` field is always taken from the incoming side.
pub fn merge_with_union(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, incoming) in source {
        if key == "path" {
            target.insert(key.clone(), incoming.clone());
            continue;
        }
        match (target.get_mut(key), incoming) {
            (Some(Value::Array(existing)), _) => {
                let additions: Vec<Value> = match incoming {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                for item in additions {
                    existing.push(item);
                }
                dedupe(existing);
            }
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                merge_with_union(existing, nested);
            }
            _ => {
                target.insert(key.clone(), incoming.clone());
            }
        }
    }
}

fn dedupe(items: &mut Vec<Value>) {
    let mut unique: Vec<Value> = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    *items = unique;
}

/// Join URL path fragments without duplicate slashes, keeping a trailing slash
pub fn join_path(base: &str, tail: &str) -> String {
    let joined = match (base.is_empty(), tail.is_empty()) {
        (true, true) => return ".".to_string(),
        (true, false) => tail.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{}/{}", base, tail),
    };
    normalize_path(&joined)
}

fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let trailing = path.len() > 1 && path.ends_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().map_or(false, |last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let mut result = parts.join("/");
    if absolute {
        result.insert(0, '/');
    }
    if trailing && !result.ends_with('/') {
        result.push('/');
    }
    if result.is_empty() {
        result.push('.');
    }
    result
}
