//! The HTTP-facing error type. Every handler returns `Result<_, AppError>`;
//! this is the single place that classifies a [`wager_core::Error`] (or an
//! infra error it wraps) into a status code and JSON envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::oneshot::error::RecvError;
use tokio::task::JoinError;
use tracing::error;
use wager_core::Error as CoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("internal error")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<JoinError> for AppError {
    fn from(e: JoinError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<RecvError> for AppError {
    fn from(e: RecvError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl<T> From<SendError<T>> for AppError {
    fn from(e: SendError<T>) -> Self {
        AppError::Internal(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minutes_remaining: Option<i64>,
}

impl ErrorDetail {
    fn simple(code: &'static str, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), retry_after_secs: None, minutes_remaining: None }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            AppError::Core(CoreError::Validation(msg)) => (StatusCode::BAD_REQUEST, ErrorDetail::simple("validation", msg)),
            AppError::Core(CoreError::AuthRequired) => {
                (StatusCode::UNAUTHORIZED, ErrorDetail::simple("auth_required", "authentication required"))
            }
            AppError::Core(CoreError::Forbidden(msg)) => (StatusCode::FORBIDDEN, ErrorDetail::simple("forbidden", msg)),
            AppError::Core(CoreError::NotFound(msg)) => (StatusCode::NOT_FOUND, ErrorDetail::simple("not_found", msg)),
            AppError::Core(CoreError::Conflict(msg)) => (StatusCode::CONFLICT, ErrorDetail::simple("conflict", msg)),
            AppError::Core(CoreError::RateLimited { retry_after_secs }) => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorDetail {
                    code: "rate_limited",
                    message: "too many requests, slow down".into(),
                    retry_after_secs: Some(retry_after_secs),
                    minutes_remaining: None,
                },
            ),
            AppError::Core(CoreError::Locked { minutes_remaining }) => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorDetail {
                    code: "locked",
                    message: "account temporarily locked".into(),
                    retry_after_secs: None,
                    minutes_remaining: Some(minutes_remaining),
                },
            ),
            AppError::Core(CoreError::InsufficientFunds { account_id }) => {
                error!(account_id, "insufficient funds");
                (StatusCode::CONFLICT, ErrorDetail::simple("insufficient_funds", "insufficient funds"))
            }
            AppError::Core(CoreError::UnknownAccount(id)) => {
                error!(account_id = id, "unknown account referenced");
                (StatusCode::CONFLICT, ErrorDetail::simple("conflict", "conflict"))
            }
            AppError::Core(CoreError::OtpInvalid) => (StatusCode::BAD_REQUEST, ErrorDetail::simple("otp_invalid", "invalid or expired code")),
            AppError::Core(CoreError::ProviderTransient(msg)) => {
                error!(%msg, "provider transient error surfaced after retry exhaustion");
                (StatusCode::BAD_GATEWAY, ErrorDetail::simple("provider_unavailable", "payment provider unavailable, try again"))
            }
            AppError::Core(CoreError::ProviderAuthError(msg)) => {
                error!(%msg, "provider auth error");
                (StatusCode::BAD_GATEWAY, ErrorDetail::simple("provider_error", "payment provider rejected the request"))
            }
            AppError::Core(CoreError::Invariant(msg)) => {
                error!(%msg, "invariant violated");
                (StatusCode::CONFLICT, ErrorDetail::simple("invariant", "an internal invariant was violated"))
            }
            AppError::Core(CoreError::Store(msg)) => {
                error!(%msg, "store error");
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorDetail::simple("internal", "internal error"))
            }
            AppError::Internal(msg) => {
                error!(%msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorDetail::simple("internal", "internal error"))
            }
        };
        (status, axum::Json(ErrorBody { error: detail })).into_response()
    }
}
