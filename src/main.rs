//! # Restfront - Demo Server
//!
//! Serves a Fibonacci calculator through a declarative mapping:
//!
//! ```text
//! GET /restfront/example/fibonacci/calc/27
//! => {"number": 27, "step": 27, "value": 196418, "requestId": "..."}
//! ```
//!
//! Configuration is read from `RESTFRONT_CONFIG_PATH` when set; otherwise the
//! defaults apply (single `default` portlet under `/restfront`, port 8080), with the
//! usual `RESTFRONT_*` environment overrides.

use anyhow::Context;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use restfront::core::config::DEFAULT_PORTLET;
use restfront::mapping::{InputTransform, OutputTransform};
use restfront::middleware::RequestOptions;
use restfront::observability::init_logging;
use restfront::{Failure, MappingSource, RestfrontConfig, RestfrontServer, RouteDescriptor, ServiceRegistry};

const MAX_FIBONACCI_NUMBER: u64 = 50;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().await?;
    init_logging(&config.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting restfront");

    let services = Arc::new(ServiceRegistry::new());
    services.register_method("application/example", "fibonacci", fibonacci);

    let mut server = RestfrontServer::new(config, services);
    server.register_mappings(DEFAULT_PORTLET, "example", example_mappings());
    server.start().await.context("restfront server failed")?;

    Ok(())
}

async fn load_config() -> anyhow::Result<RestfrontConfig> {
    match std::env::var("RESTFRONT_CONFIG_PATH") {
        Ok(path) => RestfrontConfig::load_from_file(&path)
            .await
            .with_context(|| format!("cannot load configuration from {}", path)),
        Err(_) => {
            let mut config = RestfrontConfig::default();
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
    }
}

/// Iterative Fibonacci: `F(0) = 0`, `F(1) = 1`
fn fibonacci_value(number: u64) -> u64 {
    let (mut current, mut next) = (0u64, 1u64);
    for _ in 0..number {
        let sum = current + next;
        current = next;
        next = sum;
    }
    current
}

async fn fibonacci(data: Value, options: Arc<RequestOptions>) -> Result<Value, Failure> {
    debug!(request_id = ?options.request_id(), input = %data, "fibonacci is invoked");
    let number = data
        .get("number")
        .and_then(Value::as_u64)
        .filter(|number| (1..=MAX_FIBONACCI_NUMBER).contains(number));
    let Some(number) = number else {
        return Err(Failure::from_value(json!({
            "input": data,
            "message": "invalid input number"
        })));
    };
    Ok(json!({
        "number": number,
        "step": number,
        "value": fibonacci_value(number),
        "requestId": options.request_id()
    }))
}

fn example_mappings() -> MappingSource {
    let calc = RouteDescriptor::new(json!({
        "path": "/fibonacci/calc/:number",
        "method": "GET",
        "serviceName": "application/example",
        "methodName": "fibonacci"
    }))
    .with_input_transform(InputTransform::new(|ctx| async move {
        let number = ctx
            .request
            .param("number")
            .and_then(|number| number.parse::<u64>().ok());
        Ok(json!({ "number": number }))
    }))
    .with_output_transform(OutputTransform::new(|result, ctx| async move {
        Ok(json!({
            "headers": {
                "X-Request-Id": ctx.options.request_id(),
                "X-Power-By": "restfront"
            },
            "body": result
        }))
    }));

    MappingSource::routes(vec![calc]).with_api_path("/example")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fibonacci_values() {
        assert_eq!(fibonacci_value(1), 1);
        assert_eq!(fibonacci_value(10), 55);
        assert_eq!(fibonacci_value(27), 196418);
    }
}
