//! # HTTP Pipeline Integration Tests
//!
//! Drives portlet routers end to end with `tower::ServiceExt::oneshot`: mapping
//! sources go in, rendered HTTP responses come out.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use restfront::core::config::PortletConfig;
use restfront::core::error_catalog::ErrorRegistry;
use restfront::mapping::{InletProcess, InputTransform, OutputTransform};
use restfront::{
    ErrorValue, Failure, MappingSource, Portlet, RestfrontConfig, RestfrontServer, RouteDescriptor,
    ServiceRegistry,
};

fn fibonacci_value(number: u64) -> u64 {
    let (mut current, mut next) = (0u64, 1u64);
    for _ in 0..number {
        let sum = current + next;
        current = next;
        next = sum;
    }
    current
}

fn services() -> Arc<ServiceRegistry> {
    let registry = ServiceRegistry::new();
    registry.register_method("calculator", "answer", |_data, _options| async move { Ok(json!(42)) });
    registry.register_method("application/example", "fibonacci", |data: Value, options| async move {
        let number = data["number"].as_u64().unwrap_or_default();
        Ok(json!({
            "number": number,
            "step": number,
            "value": fibonacci_value(number),
            "requestId": options.request_id()
        }))
    });
    registry.register_method("failures", "raise", |data: Value, _options| async move {
        let failure = match data["kind"].as_str().unwrap_or_default() {
            "null" => Failure::Null,
            "string" => Failure::Text("err".to_string()),
            "array" => Failure::List(vec![
                Failure::Text("a".to_string()),
                Failure::Error(ErrorValue::new("Error").with_message("x")),
            ]),
            "packet" => Failure::from_value(json!({"statusCode": 409, "body": {"reason": "busy"}})),
            _ => Failure::from_value(json!({})),
        };
        Err::<Value, _>(failure)
    });
    Arc::new(registry)
}

fn example_source() -> MappingSource {
    let answer = RouteDescriptor::new(json!({
        "path": "/answer",
        "method": "GET",
        "serviceName": "calculator",
        "methodName": "answer"
    }));

    let fibonacci = RouteDescriptor::new(json!({
        "path": "/fibonacci/calc/:number",
        "method": "GET",
        "serviceName": "application/example",
        "methodName": "fibonacci"
    }))
    .with_input_transform(InputTransform::new(|ctx| async move {
        let number = ctx.request.param("number").and_then(|n| n.parse::<u64>().ok());
        Ok(json!({ "number": number }))
    }))
    .with_output_transform(OutputTransform::new(|result, ctx| async move {
        Ok(json!({
            "headers": {"X-Request-Id": ctx.options.request_id(), "X-Power-By": "restfront"},
            "body": result
        }))
    }));

    let slow = RouteDescriptor::new(json!({
        "path": "/slow",
        "method": "GET",
        "serviceName": "calculator",
        "methodName": "answer",
        "timeout": 50
    }))
    .with_inlet(InletProcess::new(|_service, _response, data, _ctx| async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(data)
    }));

    let tenant = RouteDescriptor::new(json!({
        "path": "/tenant/answer",
        "method": "GET",
        "serviceName": "calculator",
        "methodName": "answer",
        "requestOptions": {"tenantId": {"headerName": "X-Tenant-Id", "required": true}}
    }));

    let failures = RouteDescriptor::new(json!({
        "path": "/failures",
        "method": "POST",
        "serviceName": "failures",
        "methodName": "raise"
    }));

    let validated = RouteDescriptor::new(json!({
        "path": "/validated",
        "method": "POST",
        "serviceName": "calculator",
        "methodName": "answer",
        "validatorSchema": {
            "statusCode": 422,
            "number": {"type": "number", "required": true}
        }
    }));

    let inlet = RouteDescriptor::new(json!({
        "path": "/inlet",
        "method": "GET",
        "serviceName": "calculator",
        "methodName": "answer"
    }))
    .with_inlet(InletProcess::new(|service, response, data, ctx| async move {
        let answer = service.call(data, ctx.options.clone()).await?;
        response.set_header("X-Handled-By", &json!("inlet"));
        response.status(201);
        response.json(&json!({ "answer": answer }));
        Ok::<Value, Failure>(json!("handled"))
    }));

    MappingSource::routes(vec![answer, fibonacci, slow, tenant, failures, validated, inlet])
        .with_api_path("/example")
}

fn router() -> Router {
    router_for(example_source())
}

fn router_for(source: MappingSource) -> Router {
    let mut sources = BTreeMap::new();
    sources.insert("example".to_string(), source);
    Portlet::from_sources(
        "default",
        PortletConfig::default(),
        sources,
        Arc::new(ErrorRegistry::new()),
        services(),
    )
    .router()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|value| value.to_str().ok())
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn json_body(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_plain_result_is_rendered_with_return_code() {
    let response = router().oneshot(get("/restfront/example/answer")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "X-Return-Code"), Some("0"));
    assert_eq!(json_body(response).await, json!(42));
}

#[tokio::test]
async fn test_fibonacci_with_transforms() {
    let request = Request::builder()
        .uri("/restfront/example/fibonacci/calc/27")
        .header("X-Request-Id", "req-27")
        .body(Body::empty())
        .unwrap();
    let response = router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "X-Request-Id"), Some("req-27"));
    assert_eq!(header(&response, "X-Power-By"), Some("restfront"));
    assert_eq!(header(&response, "X-Return-Code"), Some("0"));
    assert_eq!(
        json_body(response).await,
        json!({"number": 27, "step": 27, "value": 196418, "requestId": "req-27"})
    );
}

#[tokio::test]
async fn test_slow_inlet_times_out() {
    let response = router().oneshot(get("/restfront/example/slow")).await.unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    let body = json_body(response).await;
    assert_eq!(body["name"], "RequestTimeoutOnServer");
    assert_eq!(body["payload"], json!({"timeout": 50}));
}

#[tokio::test]
async fn test_missing_required_option() {
    let response = router().oneshot(get("/restfront/example/tenant/answer")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&response, "X-Return-Code"), Some("100"));
    let body = json_body(response).await;
    assert_eq!(body["name"], "RequestOptionNotFound");
    assert_eq!(body["payload"], json!({"requestOptions": ["tenantId"]}));

    let request = Request::builder()
        .uri("/restfront/example/tenant/answer")
        .header("X-Tenant-Id", "acme")
        .body(Body::empty())
        .unwrap();
    let response = router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_method_mismatch_is_not_found() {
    let response = router()
        .oneshot(post_json("/restfront/example/answer", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get("X-Return-Code").is_none());
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_failure_classification() {
    let cases = [
        ("null", StatusCode::INTERNAL_SERVER_ERROR, json!({"type": "null", "message": "Error is null"})),
        ("string", StatusCode::INTERNAL_SERVER_ERROR, json!({"type": "string", "message": "err"})),
        ("object", StatusCode::INTERNAL_SERVER_ERROR, json!({})),
        ("packet", StatusCode::CONFLICT, json!({"reason": "busy"})),
    ];
    for (kind, status, body) in cases {
        let response = router()
            .oneshot(post_json("/restfront/example/failures", json!({"kind": kind})))
            .await
            .unwrap();
        assert_eq!(response.status(), status, "kind {}", kind);
        assert_eq!(header(&response, "X-Return-Code"), Some("-1"), "kind {}", kind);
        assert_eq!(json_body(response).await, body, "kind {}", kind);
    }

    let response = router()
        .oneshot(post_json("/restfront/example/failures", json!({"kind": "array"})))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["type"], "array");
}

#[tokio::test]
async fn test_validator_layer() {
    let response = router()
        .oneshot(post_json("/restfront/example/validated", json!({"name": "x"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json_body(response).await,
        json!({"number": {"required": {"message": "number is required"}}, "isError": true})
    );

    let response = router()
        .oneshot(post_json("/restfront/example/validated", json!({"number": 4})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!(42));
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let response = router().oneshot(get("/restfront/example/nowhere")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_portlets_are_independent() {
    let mut config = RestfrontConfig::default();
    config.portlets.insert(
        "public".to_string(),
        PortletConfig {
            context_path: "/public".to_string(),
            ..Default::default()
        },
    );
    config.portlets.insert(
        "internal".to_string(),
        PortletConfig {
            context_path: "/internal".to_string(),
            response_options: serde_json::from_value(json!({
                "returnCode": {"headerName": "X-Internal-Code"}
            }))
            .unwrap(),
            ..Default::default()
        },
    );

    let mut server = RestfrontServer::new(config, services());
    server.register_mappings("public", "example", example_source());
    server.register_mappings("internal", "example", example_source());
    let app = server.router().await.unwrap();

    let response = app.clone().oneshot(get("/public/example/answer")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "X-Return-Code"), Some("0"));

    let response = app.oneshot(get("/internal/example/answer")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "X-Internal-Code"), Some("0"));
    assert!(response.headers().get("X-Return-Code").is_none());
}

#[tokio::test]
async fn test_inlet_response_reaches_client() {
    let response = router().oneshot(get("/restfront/example/inlet")).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(header(&response, "X-Handled-By"), Some("inlet"));
    assert!(response.headers().get("X-Return-Code").is_none());
    assert_eq!(json_body(response).await, json!({"answer": 42}));
}

fn answer_route(path: &str) -> RouteDescriptor {
    RouteDescriptor::new(json!({
        "path": path,
        "method": "GET",
        "serviceName": "calculator",
        "methodName": "answer"
    }))
}

#[tokio::test]
async fn test_bare_wildcard_path_is_routed() {
    let files = answer_route("/files/*").with_output_transform(OutputTransform::new(|_result, ctx| async move {
        Ok(json!({ "body": { "file": ctx.request.param("wildcard") } }))
    }));
    let app = router_for(MappingSource::routes(vec![files]));

    let response = app.oneshot(get("/restfront/files/docs/readme.md")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"file": "docs/readme.md"}));
}

#[tokio::test]
async fn test_conflicting_paths_are_skipped() {
    let source = MappingSource::routes(vec![
        answer_route("/a/:x"),
        answer_route("/a/*rest"),
        answer_route("/b/:id"),
        answer_route("/b/:name"),
    ]);
    let app = router_for(source);

    for uri in ["/restfront/a/1", "/restfront/b/2"] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "uri {}", uri);
        assert_eq!(json_body(response).await, json!(42), "uri {}", uri);
    }
}
