//! Error types for upstream catalog access and for the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

/// Message returned to clients whenever the catalog cannot be reached.
pub const UNREACHABLE_MESSAGE: &str = "Unable to reach the artwork catalog. Please try again later.";

/// Failure while talking to the upstream catalog.
///
/// `Clone` so that a single failed request can be handed to every caller
/// that was coalesced onto it.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("catalog returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("catalog unreachable: {0}")]
    Connectivity(String),

    #[error("catalog request timed out")]
    Timeout,

    #[error("invalid catalog payload: {0}")]
    Decode(String),
}

impl CatalogError {
    pub fn status(status: u16) -> Self {
        let message = StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Upstream error")
            .to_string();
        Self::Status { status, message }
    }

    /// HTTP status reported by the upstream, when there was a response at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Network failures, timeouts and 5xx responses may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500,
            Self::Connectivity(_) | Self::Timeout => true,
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Connectivity(err.to_string())
        }
    }
}

/// Error surfaced by a proxy route. Always rendered as `{"message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_gateway() -> Self {
        Self::new(StatusCode::BAD_GATEWAY, UNREACHABLE_MESSAGE)
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Status { status, message } => match StatusCode::from_u16(status) {
                Ok(code) => Self::new(code, message),
                Err(_) => Self::bad_gateway(),
            },
            CatalogError::Connectivity(_) | CatalogError::Timeout | CatalogError::Decode(_) => {
                Self::bad_gateway()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}
