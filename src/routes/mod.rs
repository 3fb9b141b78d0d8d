pub mod events;
pub mod health;
pub mod occurrences;

use agenda_core::AgendaError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// Standard API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Errors surfaced by route handlers
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Agenda(#[from] AgendaError),

    #[error("Invalid request body: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Agenda(AgendaError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Agenda(
                AgendaError::Validation(_) | AgendaError::Parse { .. } | AgendaError::Rule(_),
            ) => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        warn!(status = status.as_u16(), error = %self, "Request failed");

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
