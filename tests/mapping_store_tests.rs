//! # Mapping Store Integration Tests
//!
//! Declarative mapping files named in a portlet `mappingStore`, loaded through the
//! server exactly as a deployment would.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tempfile::{Builder, NamedTempFile};
use tokio_test::{assert_err, assert_ok};
use tower::ServiceExt;

use restfront::{RestfrontConfig, RestfrontServer, ServiceRegistry};

fn services() -> Arc<ServiceRegistry> {
    let registry = ServiceRegistry::new();
    registry.register_method("calculator", "double", |data: Value, _options| async move {
        let number = data["number"].as_i64().unwrap_or_default();
        Ok(json!({ "value": number * 2, "internal": true }))
    });
    Arc::new(registry)
}

fn mapping_file() -> NamedTempFile {
    let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
    write!(
        file,
        r#"
apiPath: /calc
apiMaps:
  - path: /double
    method: POST
    serviceName: calculator
    methodName: double
    input:
      mutate:
        rename:
          n: number
    output:
      mutate:
        rename:
          body.value: body.doubled
        except:
          - internal
apiDocs:
  paths:
    /double:
      post:
        summary: Doubles a number
"#
    )
    .unwrap();
    file
}

fn config_file(mapping_path: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
    write!(
        file,
        r#"
server:
  bindAddress: 127.0.0.1:0
portlets:
  default:
    contextPath: /api
    mappingStore:
      calculator: {}
"#,
        mapping_path
    )
    .unwrap();
    file
}

#[tokio::test]
async fn test_declarative_mapping_is_served() {
    let mapping = mapping_file();
    let config_file = config_file(&mapping.path().display().to_string());
    let config = assert_ok!(RestfrontConfig::load_from_file(config_file.path()).await);

    let server = RestfrontServer::new(config, services());
    let portlets = assert_ok!(server.portlets().await);
    assert_eq!(
        portlets[0].api_docs(),
        vec![json!({"paths": {"/calc/double": {"post": {"summary": "Doubles a number"}}}})]
    );

    let app = assert_ok!(server.router().await);
    let request = Request::builder()
        .method("POST")
        .uri("/api/calc/double")
        .header("content-type", "application/json")
        .body(Body::from(json!({"n": 21}).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"doubled": 42}));
}

#[tokio::test]
async fn test_missing_mapping_file_fails_startup() {
    let config_file = config_file("/does/not/exist.yaml");
    let config = assert_ok!(RestfrontConfig::load_from_file(config_file.path()).await);

    let server = RestfrontServer::new(config, services());
    let err = assert_err!(server.router().await);
    assert_eq!(err.error_type(), "MappingError");
}
