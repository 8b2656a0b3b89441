use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lockbox_core::StoreError;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::request::Reply;

#[derive(Debug, Error)]
pub enum AppErrorKind {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error("request body too large")]
    PayloadTooLarge,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage unavailable")]
    Unavailable,
    #[error("unexpected error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
#[error("{kind}")]
pub struct AppError {
    kind: AppErrorKind,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self { kind }
    }

    pub fn bad_request<T: Into<String>>(message: T) -> Self {
        Self::new(AppErrorKind::BadRequest(message.into()))
    }

    pub fn not_found() -> Self {
        Self::new(AppErrorKind::NotFound)
    }

    pub fn unauthorized<T: Into<String>>(message: T) -> Self {
        Self::new(AppErrorKind::Unauthorized(message.into()))
    }

    pub fn forbidden<T: Into<String>>(message: T) -> Self {
        Self::new(AppErrorKind::Forbidden(message.into()))
    }

    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::new(AppErrorKind::Internal(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self.kind {
            AppErrorKind::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::NotFound => StatusCode::NOT_FOUND,
            AppErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppErrorKind::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppErrorKind::Forbidden(_) => StatusCode::FORBIDDEN,
            AppErrorKind::Conflict(_) => StatusCode::CONFLICT,
            AppErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppErrorKind::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable code used in response bodies and audit records.
    pub fn label(&self) -> &'static str {
        match self.kind {
            AppErrorKind::BadRequest(_) => "bad_request",
            AppErrorKind::NotFound => "not_found",
            AppErrorKind::PayloadTooLarge => "payload_too_large",
            AppErrorKind::Unauthorized(_) => "unauthorized",
            AppErrorKind::Forbidden(_) => "forbidden",
            AppErrorKind::Conflict(_) => "conflict",
            AppErrorKind::Unavailable => "unavailable",
            AppErrorKind::Internal(_) => "internal",
        }
    }

    pub fn into_reply(self) -> Reply {
        let body = ErrorBody {
            error: self.label(),
            message: self.kind.to_string(),
        };
        Reply::json(self.status(), &body)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorBody {
            error: self.label(),
            message: self.kind.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        let kind = match value {
            StoreError::NotFound { .. } => AppErrorKind::NotFound,
            StoreError::Conflict { key } => AppErrorKind::Conflict(format!("conflicting write for {key}")),
            StoreError::Unavailable(detail) => {
                warn!(%detail, "backing store unavailable");
                AppErrorKind::Unavailable
            }
            // Crypto detail stays server-side; callers only see an opaque
            // storage failure.
            StoreError::Integrity(detail) => {
                warn!(%detail, "stored record failed integrity checks");
                AppErrorKind::Internal("storage failure".into())
            }
        };
        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_errors_are_opaque() {
        let err: AppError = StoreError::Integrity("envelope authentication failed".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let reply = err.into_reply();
        let body = String::from_utf8(reply.body.unwrap()).unwrap();
        assert!(!body.contains("authentication"));
        assert!(!body.contains("envelope"));
    }

    #[test]
    fn store_not_found_maps_to_404() {
        let err: AppError = StoreError::NotFound { key: "k".into() }.into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.label(), "not_found");
    }
}
