//! Hook types a mapping can plug into the pipeline.
//!
//! Every hook is an `Arc`'d async closure returning a boxed `'static` future, so a
//! plan built once per mapping can hand clones of it to every request. Hooks receive
//! a [`StageContext`] by value: the shared request, the extracted request options and
//! the [`Services`] capability struct.

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::core::error_catalog::ErrorBuilder;
use crate::core::failure::Failure;
use crate::core::types::{ResponseWriter, RestRequest};
use crate::discovery::service_registry::ServiceMethod;
use crate::middleware::options::RequestOptions;
use crate::middleware::validator::SchemaValidator;

/// Declares a cloneable async hook wrapper around an `Arc<dyn Fn>`.
///
/// Equality is pointer identity: two hooks are equal when they share the same closure.
macro_rules! define_hook {
    ($(#[$meta:meta])* $name:ident ( $($arg:ident : $ty:ty),* ) -> $out:ty) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name(Arc<dyn Fn($($ty),*) -> BoxFuture<'static, $out> + Send + Sync>);

        impl $name {
            pub fn new<F, Fut>(f: F) -> Self
            where
                F: Fn($($ty),*) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = $out> + Send + 'static,
            {
                Self(Arc::new(move |$($arg: $ty),*| f($($arg),*).boxed()))
            }

            pub fn call(&self, $($arg: $ty),*) -> BoxFuture<'static, $out> {
                (self.0)($($arg),*)
            }

            pub fn ptr_eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0)
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.ptr_eq(other)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(..)"))
            }
        }
    };
}

pub(crate) use define_hook;

/// Capabilities handed to every hook
#[derive(Clone)]
pub struct Services {
    /// Error builder of the mapping's error source
    pub error_builder: Arc<dyn ErrorBuilder>,
    pub schema_validator: Option<Arc<dyn SchemaValidator>>,
    /// Per-request span; hooks can enter it or record fields on it
    pub span: tracing::Span,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("error_builder", &self.error_builder)
            .field("schema_validator", &self.schema_validator.is_some())
            .finish()
    }
}

/// Arguments shared by every hook invocation of one request
#[derive(Clone, Debug)]
pub struct StageContext {
    pub request: Arc<RestRequest>,
    pub options: Arc<RequestOptions>,
    pub services: Services,
}

define_hook! {
    /// Builds the request data from the raw request
    InputTransform(ctx: StageContext) -> Result<Value, Failure>
}

define_hook! {
    /// Validates the raw request; returns `false`, `{valid: false, errorName?, errors?}` or anything else
    PreValidator(ctx: StageContext) -> Result<Value, Failure>
}

define_hook! {
    /// Validates the transformed request data
    PostValidator(data: Value, ctx: StageContext) -> Result<Value, Failure>
}

define_hook! {
    /// Takes over dispatch and response writing entirely
    InletProcess(
        service: ServiceMethod,
        response: Arc<dyn ResponseWriter>,
        data: Value,
        ctx: StageContext
    ) -> Result<Value, Failure>
}

define_hook! {
    /// Turns the service result into a packet (or a bare body)
    OutputTransform(result: Value, ctx: StageContext) -> Result<Value, Failure>
}

define_hook! {
    /// Rewrites an object body right before rendering
    Sanitizer(body: Value, ctx: StageContext) -> Result<Value, Failure>
}

define_hook! {
    /// Maps a failure to another failure (or, under the legacy policy, to a packet)
    ErrorTransform(failure: Failure, ctx: StageContext) -> Failure
}

/// Example request/response scenarios attached to a mapping
pub trait SampleProvider: Send + Sync {
    fn names(&self) -> Vec<String>;
    fn scenario(&self, name: &str) -> Option<Value>;
}

#[derive(Clone)]
pub struct Sample(pub Arc<dyn SampleProvider>);

impl Sample {
    pub fn names(&self) -> Vec<String> {
        self.0.names()
    }

    pub fn scenario(&self, name: &str) -> Option<Value> {
        self.0.scenario(name)
    }
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sample").field(&self.names()).finish()
    }
}

/// Scenarios from a JSON object; unknown names fall back to `default`
#[derive(Debug, Clone)]
pub struct StaticSamples {
    scenarios: serde_json::Map<String, Value>,
}

impl StaticSamples {
    pub fn new(scenarios: Value) -> Self {
        Self {
            scenarios: match scenarios {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
        }
    }
}

impl SampleProvider for StaticSamples {
    fn names(&self) -> Vec<String> {
        self.scenarios.keys().cloned().collect()
    }

    fn scenario(&self, name: &str) -> Option<Value> {
        self.scenarios
            .get(name)
            .or_else(|| self.scenarios.get("default"))
            .cloned()
    }
}

/// Outcome of a pre/post validator after normalization
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub valid: bool,
    pub error_name: Option<String>,
    pub errors: Option<Value>,
}

impl Validation {
    /// Non-object results are read as `{valid: <value>}`; only an explicit `false` fails
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(object) => Self {
                valid: object.get("valid") != Some(&Value::Bool(false)),
                error_name: object
                    .get("errorName")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                errors: object.get("errors").cloned(),
            },
            other => Self {
                valid: other != Value::Bool(false),
                error_name: None,
                errors: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validation_normalization() {
        assert!(Validation::from_value(json!(true)).valid);
        assert!(Validation::from_value(Value::Null).valid);
        assert!(!Validation::from_value(json!(false)).valid);

        let failed = Validation::from_value(json!({
            "valid": false,
            "errorName": "InvalidInputNumber",
            "errors": ["number must be positive"]
        }));
        assert!(!failed.valid);
        assert_eq!(failed.error_name.as_deref(), Some("InvalidInputNumber"));
        assert_eq!(failed.errors, Some(json!(["number must be positive"])));
    }

    #[tokio::test]
    async fn test_hook_identity_and_call() {
        let transform = OutputTransform::new(|result, _ctx| async move {
            Ok(json!({ "body": result }))
        });
        let same = transform.clone();
        let other = OutputTransform::new(|result, _ctx| async move { Ok(result) });
        assert_eq!(transform, same);
        assert_ne!(transform, other);
    }

    #[test]
    fn test_static_samples_fall_back_to_default() {
        let samples = StaticSamples::new(json!({
            "default": {"request": {"method": "GET"}}
        }));
        assert_eq!(samples.names(), vec!["default".to_string()]);
        assert_eq!(samples.scenario("missing").unwrap()["request"]["method"], "GET");
    }
}
