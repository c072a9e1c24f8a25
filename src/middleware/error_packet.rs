//! # Error-to-Packet Transformation
//!
//! Every failure that reaches the pipeline's catch-all is turned into a [`Packet`]
//! here. Two policies exist:
//!
//! - [`ErrorPolicy::Modern`]: the mapping's error transform (if any) maps the failure
//!   to a new failure, which is then classified uniformly.
//! - [`ErrorPolicy::Legacy`]: the mapping's error transform returns the packet itself;
//!   only failures without a transform are classified.
//!
//! Classification distinguishes error values (name/message/status) from everything
//! else a stage can reject with. Response options with a `headerName` copy the
//! same-named field of the failure into the packet headers.

use serde_json::{json, Map, Value};

use crate::core::config::{CompatibilityFlags, DEFAULT_RETURN_CODE_HEADER};
use crate::core::failure::{scalar_body, ErrorValue, Failure};
use crate::core::types::Packet;
use crate::mapping::hooks::{ErrorTransform, StageContext};
use crate::middleware::render::return_code_header;

const PACKET_FIELDS: [&str; 3] = ["statusCode", "headers", "body"];
const LEGACY_MISSING_BODY: &str = "mapping.error.transform() output don't have body field";

/// How a mapping's error transform participates in packet building
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    #[default]
    Modern,
    Legacy,
}

impl ErrorPolicy {
    pub fn from_flags(flags: &CompatibilityFlags) -> Self {
        if flags.legacy_error_to_response {
            Self::Legacy
        } else {
            Self::Modern
        }
    }
}

/// Builds packets for failures of one mapping
#[derive(Debug, Clone, Default)]
pub struct ErrorPacketBuilder {
    policy: ErrorPolicy,
    development_mode: bool,
    response_options: Map<String, Value>,
}

impl ErrorPacketBuilder {
    pub fn new(policy: ErrorPolicy, response_options: Map<String, Value>) -> Self {
        Self {
            policy,
            development_mode: false,
            response_options,
        }
    }

    /// Include error stacks in packet bodies
    pub fn with_development_mode(mut self, development_mode: bool) -> Self {
        self.development_mode = development_mode;
        self
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Turn a failure into a packet, running the mapping's error transform when given
    pub async fn to_packet(
        &self,
        failure: Failure,
        transform: Option<&ErrorTransform>,
        ctx: StageContext,
    ) -> Packet {
        match (self.policy, transform) {
            (ErrorPolicy::Modern, Some(transform)) => {
                let transformed = transform.call(failure, ctx).await;
                self.classify(&transformed)
            }
            (ErrorPolicy::Legacy, Some(transform)) => {
                let transformed = transform.call(failure, ctx).await;
                let mut packet = Packet::from_value(transformed.to_value());
                if packet.body.is_null() {
                    packet.body = json!({ "message": LEGACY_MISSING_BODY });
                }
                packet
            }
            (_, None) => self.classify(&failure),
        }
    }

    /// Uniform classification of a failure that no transform handled
    pub fn classify(&self, failure: &Failure) -> Packet {
        match failure {
            Failure::Error(error) => self.error_packet(error),
            Failure::Object(object) => {
                let mut packet = self.object_packet(object);
                self.finish_non_error(&mut packet);
                packet
            }
            other => {
                let mut packet = Packet::with_body(scalar_body(other));
                self.finish_non_error(&mut packet);
                packet
            }
        }
    }

    fn error_packet(&self, error: &ErrorValue) -> Packet {
        let mut body = Map::new();
        body.insert("name".to_string(), Value::String(error.name.clone()));
        if let Some(message) = &error.message {
            body.insert("message".to_string(), Value::String(message.clone()));
        }
        if let Some(payload) = error.payload.as_ref().filter(|p| p.is_object() || p.is_array()) {
            body.insert("payload".to_string(), payload.clone());
        }
        if self.development_mode {
            let lines: Vec<Value> = error
                .stack
                .as_deref()
                .map(|stack| stack.split('\n').map(|line| json!(line)).collect())
                .unwrap_or_default();
            body.insert("stack".to_string(), Value::Array(lines));
        }

        let mut packet = Packet {
            status_code: Some(error.status_code.unwrap_or(500)),
            headers: Value::Object(Map::new()),
            body: Value::Object(body),
        };
        self.copy_option_headers(|name| error.field(name), &mut packet);
        packet
    }

    fn object_packet(&self, object: &Map<String, Value>) -> Packet {
        let mut packet = Packet::from_value(Value::Object(
            object
                .iter()
                .filter(|(key, _)| PACKET_FIELDS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ));
        if packet.body.is_null() {
            let rest: Map<String, Value> = object
                .iter()
                .filter(|(key, _)| {
                    !PACKET_FIELDS.contains(&key.as_str()) && !self.response_options.contains_key(*key)
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            packet.body = Value::Object(rest);
        }
        self.copy_option_headers(|name| object.get(name).cloned(), &mut packet);
        packet
    }

    /// Status defaults to 500 and the return-code header to `-1`
    fn finish_non_error(&self, packet: &mut Packet) {
        packet.status_code = Some(packet.status_code.filter(|code| *code != 0).unwrap_or(500));
        let header_name = return_code_header(&self.response_options)
            .unwrap_or(DEFAULT_RETURN_CODE_HEADER)
            .to_string();
        if let Some(headers) = packet.headers_mut() {
            headers.entry(header_name).or_insert(json!(-1));
        }
    }

    fn copy_option_headers<F>(&self, lookup: F, packet: &mut Packet)
    where
        F: Fn(&str) -> Option<Value>,
    {
        let Some(headers) = packet.headers_mut() else {
            return;
        };
        for (option_name, option) in &self.response_options {
            let Some(header_name) = option.get("headerName").and_then(Value::as_str) else {
                continue;
            };
            if let Some(value) = lookup(option_name) {
                headers.insert(header_name.to_string(), value);
            }
        }
    }
}
