use std::time::{Duration, Instant};
use tracing::{error, info, trace};

use crate::core::types::Packet;

/// Per-request log events of one pipeline run
#[derive(Debug)]
pub struct RequestLog {
    request_id: String,
    map_path: String,
    started: Instant,
}

impl RequestLog {
    pub fn new(request_id: &str, map_path: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            map_path: map_path.to_string(),
            started: Instant::now(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn arrived(&self, method: &str, url: &str, map_method: Option<&[String]>) {
        info!(
            request_id = %self.request_id,
            map_path = %self.map_path,
            map_method = ?map_method,
            method = method,
            url = url,
            "Req[{}] from [{}]{}",
            self.request_id,
            method,
            url
        );
    }

    pub fn completed(&self) {
        trace!(
            request_id = %self.request_id,
            duration_ms = self.started.elapsed().as_millis(),
            "Req[{}] is completed",
            self.request_id
        );
    }

    pub fn timed_out(&self, timeout: Duration) {
        error!(
            request_id = %self.request_id,
            timeout_ms = timeout.as_millis(),
            "Req[{}] has timeout after {:?}",
            self.request_id,
            timeout
        );
    }

    pub fn failed(&self, packet: &Packet) {
        error!(
            request_id = %self.request_id,
            status = packet.status_code.unwrap_or(500),
            headers = %packet.headers,
            body = %packet.body,
            "Req[{}] has failed",
            self.request_id
        );
    }

    pub fn ended(&self) {
        trace!(
            request_id = %self.request_id,
            duration_ms = self.started.elapsed().as_millis(),
            "Req[{}] end",
            self.request_id
        );
    }
}
