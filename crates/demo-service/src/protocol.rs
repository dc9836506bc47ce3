//! JSON bodies returned by the demo endpoints.

use serde::{Deserialize, Serialize};

/// Response body for `GET /hello/:name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreetingResponse {
    pub message: String,
    /// Requests served by this process so far.
    pub served: u64,
}

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"not_found"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving.
    pub status: String,
    /// Instrumentations exporting spans.
    pub instrumentations: Vec<String>,
    /// Whether request metrics are exported.
    pub metrics: bool,
}
