use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::auth::AuthError;
use crate::ingest::IngestError;
use crate::store::StoreError;
use crate::templates;

/// Error type for HTTP handlers.
///
/// Maps the failure taxonomy onto status codes: client mistakes are 4xx with a
/// readable message, missing credentials get a login link, and infrastructure
/// failures are a 500 for that request only.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Unauthorized where no interactive login exists to link to.
    #[error("bearer token required: {0}")]
    BearerRequired(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg).into_response(),
            AppError::Unauthorized(reason) => {
                tracing::debug!(reason = %reason, "Unauthorized request");
                (
                    StatusCode::UNAUTHORIZED,
                    [(header::CONTENT_TYPE, templates::HTML_CONTENT_TYPE)],
                    templates::NOT_LOGGED_IN,
                )
                    .into_response()
            }
            AppError::BearerRequired(reason) => {
                tracing::debug!(reason = %reason, "Unauthorized request");
                (
                    StatusCode::UNAUTHORIZED,
                    [(header::WWW_AUTHENTICATE, "Bearer")],
                    "Authentication required: send an 'Authorization: Bearer <token>' header.",
                )
                    .into_response()
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg).into_response(),
            AppError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthorized(_) | AuthError::InvalidToken(_) | AuthError::StateMismatch => {
                AppError::Unauthorized(e.to_string())
            }
            AuthError::Forbidden { .. } => AppError::Forbidden("User is not authorized.".into()),
            AuthError::Provider(_) | AuthError::Signing(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidId(_) => AppError::BadRequest(e.to_string()),
            StoreError::Io { .. } => AppError::Internal(e.to_string()),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::InvalidPayload(_) => AppError::BadRequest(e.to_string()),
            IngestError::Store(inner) => inner.into(),
            IngestError::Queue(_) | IngestError::Grade(_) => AppError::Internal(e.to_string()),
        }
    }
}
