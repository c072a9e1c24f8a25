//! # Request Metrics
//!
//! Pipeline counters and latency recorded through the `metrics` facade. The library
//! installs no recorder or exporter; without one every call is a no-op.
//!
//! - `restfront_requests_total{status}`: rendered responses by status code
//! - `restfront_request_failures_total{name}`: failures by error name (or failure kind)
//! - `restfront_request_duration_seconds{map_path}`: time from dispatch to settle

use std::time::Instant;

pub const REQUESTS_TOTAL: &str = "restfront_requests_total";
pub const REQUEST_FAILURES_TOTAL: &str = "restfront_request_failures_total";
pub const REQUEST_DURATION_SECONDS: &str = "restfront_request_duration_seconds";

/// Count a rendered response
pub fn record_response(status_code: u16) {
    metrics::counter!(REQUESTS_TOTAL, "status" => status_code.to_string()).increment(1);
}

/// Count a failed request by failure label
pub fn record_failure(name: &str) {
    metrics::counter!(REQUEST_FAILURES_TOTAL, "name" => name.to_string()).increment(1);
}

/// Measures one request from creation until [`RequestTimer::finish`]
#[derive(Debug)]
pub struct RequestTimer {
    map_path: String,
    started: Instant,
}

impl RequestTimer {
    pub fn start(map_path: &str) -> Self {
        Self {
            map_path: map_path.to_string(),
            started: Instant::now(),
        }
    }

    pub fn finish(self) {
        metrics::histogram!(REQUEST_DURATION_SECONDS, "map_path" => self.map_path)
            .record(self.started.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_response(200);
        record_failure("RequestTimeoutOnServer");
        RequestTimer::start("/fibonacci/calc/:number").finish();
    }
}
