//! Liveness endpoint.

use axum::http::StatusCode;

/// `GET /health`: 200 with the text "OK" while the server is running.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
