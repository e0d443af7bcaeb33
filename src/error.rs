use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::services::invitations::DeliveryReport;

/// Validation messages keyed by the offending field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("mail transport error: {0}")]
    Mail(String),
    #[error("{0}")]
    Delivery(DeliveryReport),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
    #[error("Invalid input")]
    InvalidInput(FieldErrors),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Config(_)
            | AppError::Io(_)
            | AppError::Database(_)
            | AppError::Mail(_)
            | AppError::Delivery(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Other(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::InvalidInput(fields) => json!({
                "message": "Invalid input",
                "erro": fields,
            }),
            AppError::NotFound(message) | AppError::BadRequest(message) => {
                json!({ "message": message })
            }
            other => {
                error!("request failed: {other:?}");
                json!({ "message": "internal server error" })
            }
        };

        (status, Json(body)).into_response()
    }
}
