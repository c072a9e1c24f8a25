//! Request id resolution: the inbound `X-Request-Id` header when present, else a fresh UUID v4.

use uuid::Uuid;

use crate::core::types::RestRequest;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

pub trait TracelogService: Send + Sync {
    fn get_request_id(&self, request: &RestRequest) -> String;
}

#[derive(Debug, Clone)]
pub struct HeaderTracelog {
    header_name: String,
}

impl HeaderTracelog {
    pub fn new<S: Into<String>>(header_name: S) -> Self {
        Self {
            header_name: header_name.into(),
        }
    }
}

impl Default for HeaderTracelog {
    fn default() -> Self {
        Self::new(REQUEST_ID_HEADER)
    }
}

impl TracelogService for HeaderTracelog {
    fn get_request_id(&self, request: &RestRequest) -> String {
        request
            .header(&self.header_name)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}
