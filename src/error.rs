//! Unified error taxonomy for the gateway.
//!
//! A `thiserror` enum with one variant per error kind, each carrying its own
//! HTTP status mapping. Handlers return `Result<T, AppError>` and propagate
//! with `?`; the `IntoResponse` impl maps each variant to its status code.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Malformed request, failed dependency, failed backend, missed deadline, or
/// programmer error — five distinct kinds, not subclasses of one catch-all.
/// Callers match on the variant, not a message string.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or contradictory request. Never retried; always `400`.
    #[error("validation error: {0}")]
    Validation(String),

    /// The embedding backend or difficulty scorer failed. The Routing Policy
    /// may still recover (semantic unavailable falls through to difficulty);
    /// this variant surfaces once there is nowhere left to fall back to.
    #[error("external dependency failed: {0}")]
    ExternalDependency(String),

    /// The chat-completion backend returned a non-success or unparseable
    /// body and no further availability fallback applies. `502`, with the
    /// originating backend identified in the message.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The inbound request's deadline elapsed before a response was
    /// produced. `504`; in-flight outbound calls are cancelled.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A state the implementation should have prevented. `500`.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ExternalDependency(_) => StatusCode::BAD_GATEWAY,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        match status {
            StatusCode::INTERNAL_SERVER_ERROR => tracing::error!(error = %self, "internal error"),
            _ => tracing::warn!(error = %self, %status, "request failed"),
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Anything convertible into `anyhow::Error` (io errors, parse errors, etc.)
/// defaults to `Internal` — call sites that know better should construct the
/// specific variant directly instead of relying on `?`.
impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        Self::ExternalDependency(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::ExternalDependency("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(AppError::Upstream("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(AppError::DeadlineExceeded.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            AppError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
