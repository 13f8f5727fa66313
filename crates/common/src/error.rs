//! Error types for emissary.
//!
//! Every terminal condition of inbox handling is translated into exactly one
//! [`AppError`] before it reaches the remote peer. Server-side variants never
//! expose their detail text in the response body; it is only logged.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Message returned to peers for every 5xx response.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    /// The request body is not in an accepted media type (406).
    #[error("Not acceptable: {0}")]
    NotAcceptable(String),

    /// The requester could not be authenticated (401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The requester is not allowed to do this (403).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The request is malformed (400).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource not found (404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation is not offered (405).
    #[error("Method not allowed")]
    MethodNotAllowed,

    // === Server Errors ===
    /// Configuration error (500).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Any other server-side failure (500). The detail is only logged.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client Errors
            Self::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,

            // 5xx Server Errors
            Self::Config(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotAcceptable(_) => "NOT_ACCEPTABLE",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// The message that is safe to hand to a remote peer.
    ///
    /// Client errors carry a message written for the peer; server errors
    /// collapse to [`INTERNAL_ERROR_MESSAGE`].
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::NotAcceptable(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::NotFound(msg) => msg.clone(),
            Self::MethodNotAllowed => "Method not allowed".to_string(),
            Self::Config(_) | Self::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        // Log server errors
        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.public_message(),
            }
        }));

        (status, body).into_response()
    }
}

// === From implementations ===

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}
