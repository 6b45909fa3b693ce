use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message returned to clients for anything not in the taxonomy.
pub const INTERNAL_MESSAGE: &str = "Internal server error";

/// Application error taxonomy. Each variant maps to one HTTP status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller. Internal errors never expose their text.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Internal(_) => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    /// Full diagnostic detail, for server-side logs only.
    fn detail(&self) -> String {
        match self {
            AppError::Internal(e) => format!("{e:?}"),
            other => other.to_string(),
        }
    }
}

/// Client-facing error body: `{code, message}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            message: message.into(),
        }
    }
}

/// Diagnostic detail carried in response extensions so the error middleware
/// can log it alongside request metadata.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let report = ErrorReport {
            status,
            detail: self.detail(),
        };
        let mut response = (status, Json(ErrorBody::new(status, self.client_message()))).into_response();
        response.extensions_mut().insert(report);
        response
    }
}

/// Failures surfaced by the storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{field} {value} is already taken")]
    Conflict { field: &'static str, value: String },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => AppError::Conflict(err.to_string()),
            StoreError::Database(e) => {
                AppError::Internal(anyhow::Error::new(e).context("storage backend failure"))
            }
        }
    }
}
