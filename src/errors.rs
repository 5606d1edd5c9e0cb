use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::services::bookings::BookingError;
use crate::services::pricing::PricingError;
use crate::services::scheduling::SchedulingError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("validation failed")]
    Validation(Vec<String>),

    #[error("{0}")]
    Conflict(String),

    #[error("order subsystem error: {0}")]
    Commerce(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SchedulingError> for AppError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::Invalid { messages } => AppError::Validation(messages),
            conflict @ SchedulingError::Conflict { .. } => AppError::Conflict(conflict.to_string()),
            SchedulingError::Store(e) => AppError::Internal(e),
        }
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        AppError::Validation(vec![err.to_string()])
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::UnknownResource(id) => AppError::NotFound(format!("resource {id}")),
            BookingError::NotFound(id) => AppError::NotFound(format!("booking {id}")),
            BookingError::Scheduling(e) => e.into(),
            BookingError::Pricing(e) => e.into(),
            BookingError::Sync(e) => AppError::Commerce(format!("{e:#}")),
            BookingError::Other(e) => AppError::Internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Commerce(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let details = match &self {
            AppError::Validation(messages) => messages.clone(),
            _ => vec![],
        };
        let body = serde_json::json!({ "error": self.to_string(), "details": details });
        (status, axum::Json(body)).into_response()
    }
}
