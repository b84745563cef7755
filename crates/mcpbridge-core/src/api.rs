//! Shared HTTP API types and error mapping.
//!
//! Both services answer failures with the same envelope, `{"detail": …}`,
//! so the error type and the small acknowledgement bodies live here.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// API-level failure, mapped onto an HTTP status and `{"detail": …}` body.
///
/// Every handler returns `Result<_, ApiError>`; anything not covered by a
/// more specific variant funnels into `Internal` with its string form.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed inbound request body.
    #[error("{0}")]
    Validation(String),

    /// Domain lookup failed (e.g. unknown user).
    #[error("{0}")]
    NotFound(String),

    /// Remote API returned a non-success status that is passed through.
    #[error("remote API returned {status}: {detail}")]
    Remote {
        /// Remote HTTP status code.
        status: u16,
        /// Remote response body.
        detail: String,
    },

    /// Missing configuration, I/O, or transport failure.
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Remote { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn into_detail(self) -> String {
        match self {
            Self::Validation(detail) | Self::NotFound(detail) | Self::Internal(detail) => detail,
            Self::Remote { detail, .. } => detail,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!(status = status.as_u16(), error = %self, "request failed");
        (status, Json(ErrorBody { detail: self.into_detail() })).into_response()
    }
}

impl From<crate::envfile::EnvFileError> for ApiError {
    fn from(err: crate::envfile::EnvFileError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Success acknowledgement body: `{"success": true, "message": …}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    /// Always true on the success path.
    pub success: bool,
    /// Human-readable confirmation.
    pub message: String,
}

impl Ack {
    /// Acknowledge with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Body of `PUT /api/mcp/config`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigUpdate {
    /// Key/value pairs to merge into the persisted configuration.
    pub config: BTreeMap<String, String>,
}
