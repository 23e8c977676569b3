//! Service-level errors and their HTTP rendering.
//!
//! Domain rejections pass through unchanged in [`AppError::Domain`]. Storage
//! faults are logged here and reported to the caller without their details.

use std::collections::BTreeMap;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diesel_async::pooled_connection::PoolError;
use serde::Serialize;
use shared::LunchError;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] LunchError),

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// A conditional write found the row changed since it was read.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] bb8::RunError<PoolError>),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<Uuid, i64>>,
}

impl AppError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Domain(err) => match err {
                LunchError::Validation(_) => StatusCode::BAD_REQUEST,
                LunchError::NotFound(_) => StatusCode::NOT_FOUND,
                LunchError::CapacityConflict(_) | LunchError::InsufficientAvailability(_) => {
                    StatusCode::CONFLICT
                }
                LunchError::DeadlinePassed => StatusCode::UNPROCESSABLE_ENTITY,
            },
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Pool(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::Domain(err) => err.kind(),
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict(_) => "conflict",
            AppError::Database(_) | AppError::Pool(_) => "internal_error",
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Domain(LunchError::validation(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let data = match &self {
            AppError::Domain(err) => err.offending_dishes().cloned(),
            _ => None,
        };

        let body = ErrorResponse {
            error: self.kind().to_string(),
            message,
            data,
        };

        (status, Json(body)).into_response()
    }
}
