pub mod messages;
pub mod middleware;
pub mod profiles;
pub mod state;
pub mod typing;
pub mod voice;

use axum::http::StatusCode;
use tracing::error;

/// Log-and-500 for failures the caller can do nothing about.
pub(crate) fn internal<E: std::fmt::Display>(e: E) -> StatusCode {
    error!("internal error: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}
