//! HTTP error mapping
//!
//! Storage and transport detail is logged here and never sent to clients.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::types::{ApiResponse, error_codes};
use crate::ledger::LedgerError;
use crate::user_auth::AuthError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    pub fn unauthorized(code: i32, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, msg)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            "Internal error, try again later",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiResponse::<()>::error(self.code, self.msg)),
        )
            .into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        tracing::error!(error = %e, "Ledger operation failed");
        ApiError::internal()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::bad_request(e.body_text())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidInput(msg) => ApiError::bad_request(msg),
            AuthError::LoginTaken => ApiError::new(
                StatusCode::CONFLICT,
                error_codes::LOGIN_TAKEN,
                "Login already taken",
            ),
            AuthError::InvalidCredentials => {
                ApiError::unauthorized(error_codes::AUTH_FAILED, "Invalid login or password")
            }
            AuthError::InvalidToken => {
                ApiError::unauthorized(error_codes::AUTH_FAILED, "Invalid or expired token")
            }
            other => {
                tracing::error!(error = %other, "Authentication failed internally");
                ApiError::internal()
            }
        }
    }
}
