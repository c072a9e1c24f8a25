//! Narrowing of service results before they become response bodies.
//!
//! A [`ResultFilter`] selects a sub-tree (`basepath`), keeps only some of its fields
//! (`pick`) and drops others (`omit`). It can wrap an [`OutputTransform`] so the
//! filtered result is what the transform sees.

use serde_json::{Map, Value};

use crate::mapping::fields::{get_path, omit_paths, set_path};
use crate::mapping::hooks::OutputTransform;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultFilter {
    pub basepath: Option<String>,
    pub pick: Option<Vec<String>>,
    pub omit: Option<Vec<String>>,
}

impl ResultFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn basepath<S: Into<String>>(mut self, basepath: S) -> Self {
        self.basepath = Some(basepath.into());
        self
    }

    pub fn pick<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pick = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn omit<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.omit = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Filter an object result; anything else passes through untouched
    pub fn apply(&self, result: Value) -> Value {
        if !result.is_object() {
            return result;
        }
        let mut result = result;
        let mut target = match &self.basepath {
            Some(basepath) => get_path(&result, basepath).cloned().unwrap_or(Value::Null),
            None => result.clone(),
        };
        if let Some(pick) = &self.pick {
            target = pick_paths(&target, pick);
        }
        if let Some(omit) = &self.omit {
            target = omit_paths(&target, omit);
        }
        match &self.basepath {
            Some(basepath) => {
                set_path(&mut result, basepath, target);
                result
            }
            None => target,
        }
    }

    /// Output transform applying this filter, then `next` when given
    pub fn into_output_transform(self, next: Option<OutputTransform>) -> OutputTransform {
        OutputTransform::new(move |result, ctx| {
            let filtered = self.apply(result);
            let next = next.clone();
            async move {
                match next {
                    Some(next) => next.call(filtered, ctx).await,
                    None => Ok(filtered),
                }
            }
        })
    }
}

fn pick_paths(data: &Value, paths: &[String]) -> Value {
    let mut picked = Value::Object(Map::new());
    for path in paths {
        if let Some(value) = get_path(data, path) {
            set_path(&mut picked, path, value.clone());
        }
    }
    picked
}
