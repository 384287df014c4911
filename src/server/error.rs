use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::Error;

/// Crate error rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: &'static str,
    detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            Error::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Protocol(_) | Error::Transport(_) => StatusCode::BAD_GATEWAY,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self.0 {
            Error::Configuration(_) => "Mail credentials are not configured",
            Error::Protocol(_) => "The mailbox could not be reached",
            Error::Parse(_) => "A message could not be parsed",
            Error::Generation(_) => "Text generation failed",
            Error::Transport(_) => "The message could not be sent",
            Error::NotFound(_) => "Not found",
            Error::InvalidRequest(_) => "Invalid request",
            Error::Database(_) | Error::Serde(_) => "Internal error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}: {}", self.0.kind(), self.0);
        } else {
            tracing::warn!("{}: {}", self.0.kind(), self.0);
        }

        let body = ErrorResponse {
            error: self.0.kind(),
            message: self.message(),
            detail: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
