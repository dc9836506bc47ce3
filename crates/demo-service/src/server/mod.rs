//! Axum HTTP server, routing, and middleware.

pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
