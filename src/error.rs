//! # Error Handling
//!
//! Custom error types and their conversion into HTTP responses.
//!
//! The API contract is intentionally plain: every failure body is a flat
//! `{"error": "<message>"}` with the status carrying the category. Client
//! mistakes (missing fields, unsupported extensions, unknown language pairs)
//! map to 400; missing pages to 404; model invocation failures to 500 with
//! the raw engine message in the body.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Error categories surfaced by the HTTP layer.
#[derive(Debug)]
pub enum AppError {
    /// Client sent invalid or malformed data (400).
    BadRequest(String),

    /// Requested resource was not found (404).
    NotFound(String),

    /// A model invocation failed; the message is passed through to the
    /// client verbatim (500).
    Inference(String),

    /// Any other server-side failure (500).
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Inference(msg) => write!(f, "Inference error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (actix_web::http::StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (actix_web::http::StatusCode::NOT_FOUND, msg),
            AppError::Inference(msg) => {
                (actix_web::http::StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            AppError::Internal(msg) => {
                (actix_web::http::StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        HttpResponse::build(status).json(json!({ "error": message }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Shorthand for handler results.
pub type AppResult<T> = Result<T, AppError>;
