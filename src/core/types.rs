//! # Core Types Module
//!
//! The request, response and packet types every pipeline stage works with.
//!
//! - [`RestRequest`] is what hooks see: method, URI, headers, parsed JSON body and
//!   route parameters. It is shared as `Arc<RestRequest>` so hooks can hold onto it
//!   across await points.
//! - [`ResponseWriter`] is the host's response object. Methods take `&self` so the
//!   pipeline and an inlet hook can both write through an `Arc<dyn ResponseWriter>`.
//! - [`Packet`] is the `{statusCode, headers, body}` representation produced before
//!   rendering.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use tracing::warn;

/// An inbound REST request as seen by mapping hooks
#[derive(Debug, Clone)]
pub struct RestRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: Method,

    /// Request URI including path and query parameters
    pub uri: Uri,

    /// Request headers
    pub headers: HeaderMap,

    /// Parsed body (`Null` when the request had none)
    pub body: Value,

    /// Route parameters captured by the router (`:id` placeholders)
    pub params: HashMap<String, String>,

    /// Decoded query string parameters
    pub query: HashMap<String, String>,
}

impl RestRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Value::Null,
            params: HashMap::new(),
            query: HashMap::new(),
        }
    }

    /// Add a header, ignoring names or values that are not valid HTTP
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!(header = name, "Ignoring invalid request header"),
        }
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    /// Get the request path without query parameters
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Path plus query string, as originally requested
    pub fn url(&self) -> String {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| self.uri.path().to_string())
    }

    /// Get a header value by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// The host framework's response object
pub trait ResponseWriter: Send + Sync {
    fn set_header(&self, name: &str, value: &Value);
    fn status(&self, status_code: u16);
    /// Send a raw text body and finish
    fn send(&self, text: &str);
    /// Send a JSON body and finish
    fn json(&self, body: &Value);
    /// Finish without a body
    fn end(&self);
    fn is_finished(&self) -> bool;
}

/// Body written to a [`ResponseBuffer`]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    Text(String),
    Json(Value),
}

/// What a [`ResponseBuffer`] has recorded so far
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
    pub finished: bool,
    /// Number of `set_header` calls, including overwrites
    pub header_writes: usize,
}

impl Default for RenderedResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: ResponseBody::Empty,
            finished: false,
            header_writes: 0,
        }
    }
}

/// Response writer that buffers everything and converts into an axum response
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    state: Mutex<RenderedResponse>,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RenderedResponse {
        self.state.lock().clone()
    }

    /// Build the HTTP response; invalid header names or values are dropped with a warning
    pub fn into_response(&self) -> Response {
        let rendered = self.snapshot();
        let status = StatusCode::from_u16(rendered.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = match rendered.body {
            ResponseBody::Empty => Response::new(Body::empty()),
            ResponseBody::Text(text) => {
                let mut response = Response::new(Body::from(text));
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/html; charset=utf-8"),
                );
                response
            }
            ResponseBody::Json(value) => axum::Json(value).into_response(),
        };
        *response.status_mut() = status;

        for (name, value) in rendered.headers {
            match (HeaderName::from_str(&name), HeaderValue::from_str(&value)) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().insert(name, value);
                }
                _ => warn!(header = %name, "Dropping response header that is not valid HTTP"),
            }
        }
        response
    }
}

impl ResponseWriter for ResponseBuffer {
    fn set_header(&self, name: &str, value: &Value) {
        let mut state = self.state.lock();
        state.headers.insert(name.to_string(), header_value_string(value));
        state.header_writes += 1;
    }

    fn status(&self, status_code: u16) {
        self.state.lock().status = status_code;
    }

    fn send(&self, text: &str) {
        let mut state = self.state.lock();
        state.body = ResponseBody::Text(text.to_string());
        state.finished = true;
    }

    fn json(&self, body: &Value) {
        let mut state = self.state.lock();
        state.body = ResponseBody::Json(body.clone());
        state.finished = true;
    }

    fn end(&self) {
        let mut state = self.state.lock();
        state.body = ResponseBody::Empty;
        state.finished = true;
    }

    fn is_finished(&self) -> bool {
        self.state.lock().finished
    }
}

/// Render a JSON value as a header value string
pub fn header_value_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Number(_) | Value::Bool(_) => value.to_string(),
        other => other.to_string(),
    }
}

/// Canonical response representation produced before rendering
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Packet {
    pub status_code: Option<u16>,
    /// Normally an object of header name to value; anything else is ignored on render
    pub headers: Value,
    /// `Null` means "no body"
    pub body: Value,
}

impl Packet {
    pub fn with_body(body: Value) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }

    /// Read a packet out of a `{statusCode, headers, body}` object
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut object) => Self {
                status_code: object
                    .get("statusCode")
                    .and_then(Value::as_u64)
                    .and_then(|code| u16::try_from(code).ok()),
                headers: object.remove("headers").unwrap_or(Value::Null),
                body: object.remove("body").unwrap_or(Value::Null),
            },
            other => Self::with_body(other),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        if let Some(status_code) = self.status_code {
            object.insert("statusCode".to_string(), Value::from(status_code));
        }
        if !self.headers.is_null() {
            object.insert("headers".to_string(), self.headers.clone());
        }
        if !self.body.is_null() {
            object.insert("body".to_string(), self.body.clone());
        }
        Value::Object(object)
    }

    /// Headers as a mutable map, creating it when absent; `None` when headers hold a non-object
    pub fn headers_mut(&mut self) -> Option<&mut Map<String, Value>> {
        if self.headers.is_null() {
            self.headers = Value::Object(Map::new());
        }
        self.headers.as_object_mut()
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.as_object().and_then(|headers| headers.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_header_lookup_is_case_insensitive() {
        let request = RestRequest::new(Method::GET, Uri::from_static("/rest/fibonacci?x=1"))
            .with_header("X-Request-Id", "abc");
        assert_eq!(request.header("x-request-id"), Some("abc"));
        assert_eq!(request.url(), "/rest/fibonacci?x=1");
        assert_eq!(request.path(), "/rest/fibonacci");
    }

    #[test]
    fn test_packet_round_trip_keeps_headers_as_given() {
        let packet = Packet::from_value(json!({
            "statusCode": 201,
            "headers": "not-an-object",
            "body": {"ok": true}
        }));
        assert_eq!(packet.status_code, Some(201));
        assert_eq!(packet.headers, json!("not-an-object"));
        assert_eq!(packet.to_value()["body"], json!({"ok": true}));
    }

    #[test]
    fn test_headers_mut_creates_missing_map() {
        let mut packet = Packet::with_body(json!(1));
        packet.headers_mut().unwrap().insert("X-Return-Code".into(), json!(0));
        assert_eq!(packet.header("X-Return-Code"), Some(&json!(0)));

        let mut broken = Packet {
            headers: json!(true),
            ..Default::default()
        };
        assert!(broken.headers_mut().is_none());
    }

    #[test]
    fn test_response_buffer_into_response() {
        let buffer = ResponseBuffer::new();
        buffer.set_header("X-Return-Code", &json!(0));
        buffer.status(201);
        buffer.json(&json!({"value": 42}));

        let response = buffer.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get("x-return-code").unwrap(), "0");
    }
}
