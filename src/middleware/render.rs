//! # Packet Rendering
//!
//! Writes a [`Packet`] onto a [`ResponseWriter`]: headers, then status (200 by
//! default), then the body (`Null` ends the response, strings are sent as text,
//! everything else as JSON).
//!
//! The renderer is chosen when a pipeline is built. Both implementations behave the
//! same for packets whose headers are an object; they differ only for malformed
//! headers values.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::core::types::{Packet, ResponseWriter};

pub trait PacketRenderer: Send + Sync + fmt::Debug {
    fn render(&self, packet: &Packet, response: &dyn ResponseWriter);
}

/// Applies headers from any container: object entries, or array items keyed by index
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRenderer;

/// Applies headers only from a plain object
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizedRenderer;

impl PacketRenderer for StandardRenderer {
    fn render(&self, packet: &Packet, response: &dyn ResponseWriter) {
        match &packet.headers {
            Value::Object(headers) => {
                for (name, value) in headers {
                    response.set_header(name, value);
                }
            }
            Value::Array(items) => {
                for (index, value) in items.iter().enumerate() {
                    response.set_header(&index.to_string(), value);
                }
            }
            _ => {}
        }
        write_status_and_body(packet, response);
    }
}

impl PacketRenderer for OptimizedRenderer {
    fn render(&self, packet: &Packet, response: &dyn ResponseWriter) {
        if let Value::Object(headers) = &packet.headers {
            for (name, value) in headers {
                response.set_header(name, value);
            }
        }
        write_status_and_body(packet, response);
    }
}

fn write_status_and_body(packet: &Packet, response: &dyn ResponseWriter) {
    response.status(packet.status_code.unwrap_or(200));
    match &packet.body {
        Value::Null => response.end(),
        Value::String(text) => response.send(text),
        body => response.json(body),
    }
}

/// Header name configured under `responseOptions.returnCode.headerName`
pub fn return_code_header(response_options: &Map<String, Value>) -> Option<&str> {
    response_options
        .get("returnCode")
        .and_then(|option| option.get("headerName"))
        .and_then(Value::as_str)
}

/// Success-path headers: the return-code header defaults to `0` unless already set
pub fn add_default_response_headers(mut packet: Packet, response_options: &Map<String, Value>) -> Packet {
    let header_name = return_code_header(response_options).map(str::to_string);
    if let Some(headers) = packet.headers_mut() {
        if let Some(header_name) = header_name {
            headers.entry(header_name).or_insert(Value::from(0));
        }
    }
    packet
}

/// Renderer selected by the `optimizedRenderer` compatibility flag
pub fn renderer_for(optimized: bool) -> Arc<dyn PacketRenderer> {
    if optimized {
        Arc::new(OptimizedRenderer)
    } else {
        Arc::new(StandardRenderer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ResponseBody, ResponseBuffer};
    use serde_json::json;

    fn render_with(renderer: &dyn PacketRenderer, packet: &Packet) -> crate::core::types::RenderedResponse {
        let buffer = ResponseBuffer::new();
        renderer.render(packet, &buffer);
        buffer.snapshot()
    }

    #[test]
    fn test_renderers_agree_on_well_formed_packets() {
        let packets = vec![
            Packet::from_value(json!({"statusCode": 201, "headers": {"X-Return-Code": 0}, "body": {"value": 1}})),
            Packet::from_value(json!({"body": "plain text"})),
            Packet::from_value(json!({"headers": {"X-Power-By": "restfront"}})),
        ];
        for packet in &packets {
            assert_eq!(
                render_with(&StandardRenderer, packet),
                render_with(&OptimizedRenderer, packet)
            );
        }
    }

    #[test]
    fn test_body_kinds() {
        let rendered = render_with(&StandardRenderer, &Packet::with_body(json!("hello")));
        assert_eq!(rendered.status, 200);
        assert_eq!(rendered.body, ResponseBody::Text("hello".into()));
        assert!(rendered.finished);

        let rendered = render_with(&StandardRenderer, &Packet::default());
        assert_eq!(rendered.body, ResponseBody::Empty);
        assert!(rendered.finished);

        let rendered = render_with(&StandardRenderer, &Packet::with_body(json!(42)));
        assert_eq!(rendered.body, ResponseBody::Json(json!(42)));
    }

    #[test]
    fn test_non_object_headers_are_ignored() {
        for headers in [json!("X-Return-Code"), json!(true), json!(7), Value::Null] {
            let packet = Packet {
                status_code: Some(500),
                headers,
                body: json!({}),
            };
            let rendered = render_with(&OptimizedRenderer, &packet);
            assert_eq!(rendered.header_writes, 0);
            assert_eq!(rendered.status, 500);
        }
    }

    #[test]
    fn test_default_return_code_header() {
        let options = json!({"returnCode": {"headerName": "X-Return-Code"}});
        let options = options.as_object().unwrap();

        let packet = add_default_response_headers(Packet::with_body(json!({"m": 1})), options);
        assert_eq!(packet.headers, json!({"X-Return-Code": 0}));

        let preset = Packet::from_value(json!({"headers": {"X-Return-Code": 7}, "body": 1}));
        let packet = add_default_response_headers(preset, options);
        assert_eq!(packet.headers, json!({"X-Return-Code": 7}));

        let packet = add_default_response_headers(Packet::with_body(json!(1)), &Map::new());
        assert_eq!(packet.headers, json!({}));
    }

    #[test]
    fn test_renderer_selection() {
        assert_eq!(format!("{:?}", renderer_for(true)), "OptimizedRenderer");
        assert_eq!(format!("{:?}", renderer_for(false)), "StandardRenderer");
    }
}
