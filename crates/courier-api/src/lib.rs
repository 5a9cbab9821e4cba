//! # Courier API
//!
//! HTTP surface for bulk mail dispatch.
//!
//! Features:
//! - Axum-based web server
//! - Inline sends for single recipients, background jobs for bulk sends
//! - Job polling and SSE progress streams
//! - Tower middleware (request ids, tracing, CORS, timeouts, body limits)
//! - Retention sweeper for finished jobs
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod middleware;
pub mod retention;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{ConfigError, CourierConfig, SmtpSettings};
pub use error::{ApiError, ApiResult};
pub use server::{CourierServer, ServerConfig};
pub use state::AppState;
