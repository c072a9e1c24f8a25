//! # Router Module
//!
//! Turns a portlet's dispatch table into an axum [`Router`]: one route per canonical
//! path, each answered by that mapping's [`Pipeline`]. Mappings with a
//! `validatorSchema` get a validator layer in front of the pipeline.
//!
//! Mapping paths use the `/:param` and `/*rest` placeholders axum understands; a
//! bare `*` segment is registered as `*wildcard`. Every path is first checked
//! against a `matchit` radix tree, the matcher axum routes with, so paths that are
//! not absolute, malformed, or in conflict with an earlier route are skipped with a
//! warning instead of panicking inside axum.
//!
//! A request the pipeline passes on (method not served, no service method) gets an
//! empty `404`, the same as an unmatched path.

use axum::{
    body::{Body, Bytes},
    extract::{OriginalUri, Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use serde_json::Value;
use matchit::Router as RadixRouter;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::types::{ResponseBuffer, RestRequest};
use crate::discovery::tracelog::TracelogService;
use crate::mapping::aggregator::DispatchTable;
use crate::mapping::descriptor::MappingRecord;
use crate::middleware::pipeline::{Pipeline, PipelineContext, PipelineOutcome};
use crate::middleware::render::PacketRenderer;
use crate::middleware::validator::{validate_request, SchemaValidator};

/// Largest request body read into a [`RestRequest`]
pub const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

#[derive(Clone)]
struct RouteState {
    pipeline: Arc<Pipeline>,
}

#[derive(Clone)]
struct ValidatorState {
    mapping: Arc<MappingRecord>,
    validator: Arc<dyn SchemaValidator>,
    tracelog: Arc<dyn TracelogService>,
    renderer: Arc<dyn PacketRenderer>,
}

/// Name given to a bare `*` catch-all segment
pub const WILDCARD_PARAM: &str = "wildcard";

/// The path axum registers for a mapping path
pub fn route_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment == "*" {
                format!("*{}", WILDCARD_PARAM)
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the routes of one portlet; paths are relative to the portlet's general path
pub fn build_rest_router(context: &PipelineContext, table: &DispatchTable) -> Router {
    let mut router = Router::new();
    let mut registered = RadixRouter::new();

    for (path, mapping) in table {
        if !path.starts_with('/') {
            warn!(map_path = %path, "Skipping mapping without an absolute path");
            continue;
        }
        let axum_path = route_path(path);
        if let Err(err) = registered.insert(axum_path.as_str(), ()) {
            warn!(map_path = %path, error = %err, "Skipping mapping whose path cannot be routed");
            continue;
        }

        let pipeline = Arc::new(Pipeline::build(context, mapping));
        info!(
            map_path = %path,
            map_method = ?mapping.methods(),
            stages = ?pipeline.plan().stage_names(),
            "Route[{:?}][{}] is mapped",
            mapping.methods().unwrap_or_default(),
            path
        );

        let mut route = any(handle_mapping).with_state(RouteState { pipeline });
        if let (Some(_), Some(validator)) = (mapping.validator_schema(), &context.schema_validator) {
            debug!(map_path = %path, "Validator layer enabled");
            let state = ValidatorState {
                mapping: Arc::new(mapping.clone()),
                validator: validator.clone(),
                tracelog: context.tracelog.clone(),
                renderer: context.renderer.clone(),
            };
            route = route.layer(middleware::from_fn_with_state(state, validate_body));
        }
        router = router.route(&axum_path, route);
    }

    router
}

/// Mount `routes` under `general_path`
pub fn mount(general_path: &str, routes: Router) -> Router {
    if general_path.is_empty() || general_path == "/" {
        Router::new().merge(routes)
    } else {
        Router::new().nest(general_path, routes)
    }
}

fn parse_body(bytes: &Bytes) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

async fn read_body(body: Body) -> Result<Bytes, Response> {
    axum::body::to_bytes(body, MAX_BODY_SIZE).await.map_err(|err| {
        warn!(error = %err, "Failed to read request body");
        (StatusCode::BAD_REQUEST, "Failed to read request body").into_response()
    })
}

/// Convert an axum request; the URI is the one before nesting stripped the prefix
async fn into_rest_request(request: Request, params: HashMap<String, String>) -> Result<RestRequest, Response> {
    let (parts, body) = request.into_parts();
    let bytes = read_body(body).await?;

    let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(query)| query)
        .unwrap_or_default();
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map(|original| original.0.clone())
        .unwrap_or_else(|| parts.uri.clone());

    Ok(RestRequest {
        method: parts.method,
        uri,
        headers: parts.headers,
        body: parse_body(&bytes),
        params,
        query,
    })
}

async fn handle_mapping(
    State(route): State<RouteState>,
    params: Option<Path<HashMap<String, String>>>,
    request: Request,
) -> Response {
    let params = params.map(|Path(params)| params).unwrap_or_default();
    let request = match into_rest_request(request, params).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let buffer = Arc::new(ResponseBuffer::new());
    match route.pipeline.run(Arc::new(request), buffer.clone()).await {
        Ok(PipelineOutcome::Passed) => StatusCode::NOT_FOUND.into_response(),
        // failures were already rendered into the buffer
        Ok(_) | Err(_) => buffer.into_response(),
    }
}

async fn validate_body(State(state): State<ValidatorState>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match read_body(body).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };

    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map(|original| original.0.clone())
        .unwrap_or_else(|| parts.uri.clone());
    let mut checked = RestRequest::new(parts.method.clone(), uri).with_body(parse_body(&bytes));
    checked.headers = parts.headers.clone();

    match validate_request(
        &state.mapping,
        &checked,
        state.validator.as_ref(),
        state.tracelog.as_ref(),
    ) {
        Some(packet) => {
            let buffer = ResponseBuffer::new();
            state.renderer.render(&packet, &buffer);
            buffer.into_response()
        }
        None => next.run(Request::from_parts(parts, Body::from(bytes))).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_paths() {
        assert_eq!(route_path("/fibonacci/calc/:number"), "/fibonacci/calc/:number");
        assert_eq!(route_path("/files/*"), "/files/*wildcard");
        assert_eq!(route_path("/files/*rest"), "/files/*rest");
    }

    #[test]
    fn test_body_parsing() {
        assert_eq!(parse_body(&Bytes::new()), Value::Null);
        assert_eq!(parse_body(&Bytes::from_static(b"{\"n\":1}")), serde_json::json!({"n": 1}));
        assert_eq!(parse_body(&Bytes::from_static(b"n=1")), Value::String("n=1".into()));
    }
}
