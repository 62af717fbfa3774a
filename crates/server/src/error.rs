use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::ws::events::ServerEvent;
use crate::ws::gateway::chunks::ChunkError;

pub type AppResult<T> = Result<T, AppError>;

/// Error type shared by the WebSocket dispatcher and the REST routes.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// Stable code sent to clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Transfer(_) => "TRANSFER_FAILED",
            AppError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            AppError::Storage(_) | AppError::Database(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Transfer(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Storage(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show a client; driver and filesystem detail stays in the logs.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Storage(_) | AppError::Database(_) => "Internal server error".into(),
            other => other.to_string(),
        }
    }

    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::Error {
            message: self.client_message(),
            code: self.code().into(),
        }
    }

    fn log(&self) {
        match self {
            AppError::Storage(_) | AppError::Database(_) => tracing::error!(error = %self, "request failed"),
            _ => tracing::debug!(error = %self, "request rejected"),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<ChunkError> for AppError {
    fn from(e: ChunkError) -> Self {
        match e {
            ChunkError::UnknownSession => AppError::NotFound("Transfer"),
            ChunkError::NotOwner => AppError::Forbidden(e.to_string()),
            ChunkError::TooLarge { .. } => AppError::PayloadTooLarge,
            other => AppError::Transfer(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let body = serde_json::json!({
            "error": self.client_message(),
            "code": self.code(),
        });
        (self.status(), Json(body)).into_response()
    }
}

/// Log and convert into the frame sent back on the originating connection.
pub fn error_event(err: &AppError) -> ServerEvent {
    err.log();
    err.to_event()
}
