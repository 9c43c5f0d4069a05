use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::service::{AuthResponse, Credentials};
use crate::gateway::{error::ApiError, state::AppState, types::ApiResponse};

/// Token in the body and in the `Authorization` header
fn token_response(auth: AuthResponse) -> Response {
    let bearer = HeaderValue::from_str(&format!("Bearer {}", auth.token));
    let mut response = (StatusCode::OK, Json(ApiResponse::success(auth))).into_response();
    if let Ok(value) = bearer {
        response.headers_mut().insert(header::AUTHORIZATION, value);
    }
    response
}

/// Register a new user
///
/// POST /api/user/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    let auth = state.user_auth.register(req).await?;
    Ok(token_response(auth))
}

/// Login user
///
/// POST /api/user/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    match state.user_auth.login(req).await {
        Ok(auth) => Ok(token_response(auth)),
        Err(e) => {
            tracing::warn!("Login failed: {}", e);
            Err(e.into())
        }
    }
}
