use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// State conflicts detected while reading the catalog right before a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("this book is currently not available")]
    BookUnavailable,
    #[error("maximum borrowing limit of {limit} books reached")]
    BorrowLimitReached { limit: i64 },
    #[error("patron already has this book checked out")]
    AlreadyBorrowed,
    #[error("no borrow record found for this patron and book")]
    NotBorrowed,
    #[error("this loan has already been returned")]
    AlreadyReturned,
    #[error("no late fees to pay for this book")]
    NoLateFees,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Conflict(#[from] Conflict),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("payment declined: {0}")]
    PaymentDeclined(String),
    #[error("payment processing error: {0}")]
    PaymentGateway(String),
    #[error("rate limit exceeded")]
    RateLimited,
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::PaymentGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

// Names the alphabetically first failing field and joins every message in that order.
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<(String, String)> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map_or_else(|| e.code.to_string(), ToString::to_string);
                    (field.to_string(), message)
                })
            })
            .collect();
        fields.sort();

        match fields.first() {
            Some((field, _)) => AppError::Validation {
                field: field.clone(),
                message: fields
                    .iter()
                    .map(|(_, m)| m.as_str())
                    .collect::<Vec<_>>()
                    .join("; "),
            },
            None => AppError::validation("request", "invalid request"),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error.cause_chain = ?self, error.message = %self, "request failed");
        }

        let body = Json(ErrorBody {
            field: match &self {
                AppError::Validation { field, .. } => Some(field.clone()),
                _ => None,
            },
            error: match &self {
                AppError::Validation { message, .. } => message.clone(),
                other => other.to_string(),
            },
        });

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
