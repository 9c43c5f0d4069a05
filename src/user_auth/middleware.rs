use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::gateway::{error::ApiError, state::AppState, types::error_codes};
use crate::models::UserId;

/// Authenticated caller, injected by [`jwt_auth_middleware`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: UserId,
}

/// Validate `Authorization: Bearer <jwt>` and inject [`CurrentUser`]
pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            ApiError::unauthorized(error_codes::MISSING_AUTH, "Missing Authorization header")
        })?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized(error_codes::AUTH_FAILED, "Invalid token format"))?;

    let claims = state.user_auth.verify_token(token)?;
    let user_id = claims.user_id()?;

    request.extensions_mut().insert(CurrentUser { user_id });
    Ok(next.run(request).await)
}
