//! callctl-server: HTTP server for calling-platform webhooks
//!
//! Axum server with:
//! - Webhook shims (persisting and log-only)
//! - Health check and opt-in debug routes
//! - Request tracing and graceful shutdown
//! - JSON error responses

pub mod error;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, run_server, AppState, ServerConfig, ServerError};
