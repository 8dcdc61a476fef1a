use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

use crate::gemini::GeminiError;

/// The field extractor could not produce usable values; the turn is retried by the user.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("language model call failed: {0}")]
    Model(#[from] GeminiError),
    #[error("extraction timed out after {0}s")]
    Timeout(u64),
    #[error("could not decode model output: {0}")]
    Decode(String),
}

/// The rendering collaborator did not return a poster.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("the rendering service did not answer within {0}s")]
    Timeout(u64),
    #[error("the rendering service rejected the poster details ({status}): {reason}")]
    Rejected { status: u16, reason: String },
    #[error("the rendering service failed ({status})")]
    Service { status: u16 },
    #[error("could not reach the rendering service: {0}")]
    Http(String),
    #[error("rendering is not configured: {0}")]
    NotConfigured(String),
    #[error("the rendering service returned no image URL")]
    MissingUrl,
}

impl RenderError {
    pub fn code(&self) -> &'static str {
        match self {
            RenderError::Timeout(_) => "timeout",
            RenderError::Rejected { .. } => "validation",
            RenderError::Service { .. } | RenderError::Http(_) | RenderError::MissingUrl => "service",
            RenderError::NotConfigured(_) => "config",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Errors returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
