//! Axum request handlers for all service endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{info, instrument};

use super::state::AppState;
use crate::protocol::{ErrorResponse, GreetingResponse, HealthResponse};

/// Longest name `/hello/:name` will echo back.
const MAX_NAME_LEN: usize = 64;

/// `GET /health` — liveness check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        instrumentations: state.instrumentations.as_ref().clone(),
        metrics: state.requests.is_some(),
    })
}

/// `GET /hello/:name` — greet the caller inside a span.
#[instrument(skip_all, fields(name_len = name.len()))]
pub async fn hello(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    if name.len() > MAX_NAME_LEN {
        let err = ErrorResponse::new(
            "bad_request",
            format!("name must be at most {MAX_NAME_LEN} bytes"),
        );
        return (StatusCode::BAD_REQUEST, Json(err)).into_response();
    }

    let served = state.record_request("/hello/:name");
    info!(served, "greeting");
    let body = GreetingResponse {
        message: format!("hello, {name}"),
        served,
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}
