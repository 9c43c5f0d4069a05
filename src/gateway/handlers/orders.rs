//! Order upload and listing

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::super::error::ApiError;
use super::super::state::AppState;
use super::super::types::{ApiResponse, OrderAccepted, error_codes};
use crate::ledger::with_deadline;
use crate::submission::{SubmissionResult, submit_order};
use crate::user_auth::CurrentUser;

/// Upload an order number (text/plain body)
///
/// POST /api/user/orders
///
/// - 202: accepted for processing
/// - 200: already uploaded by this user
/// - 409: uploaded by another user
/// - 422: fails the Luhn check
pub async fn upload_order(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    body: String,
) -> Result<Response, ApiError> {
    if body.trim().is_empty() {
        return Err(ApiError::bad_request("Order number is required"));
    }

    let result = with_deadline(
        state.request_timeout,
        submit_order(state.ledger.as_ref(), user.user_id, &body),
    )
    .await?;

    let number = body.trim().to_string();
    let response = match result {
        SubmissionResult::AcceptedNew => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(OrderAccepted { number })),
        )
            .into_response(),
        SubmissionResult::AcceptedDuplicateOwn => (
            StatusCode::OK,
            Json(ApiResponse::success(OrderAccepted { number })),
        )
            .into_response(),
        SubmissionResult::ConflictOtherOwner => {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                error_codes::ORDER_OWNED_BY_OTHER,
                "Order number already uploaded by another user",
            ));
        }
        SubmissionResult::Malformed(e) => {
            return Err(ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                error_codes::INVALID_ORDER_NUMBER,
                e.to_string(),
            ));
        }
    };
    Ok(response)
}

/// List the caller's orders, oldest first
///
/// GET /api/user/orders
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Response, ApiError> {
    let orders = with_deadline(state.request_timeout, state.ledger.orders_of(user.user_id)).await?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok((StatusCode::OK, Json(ApiResponse::success(orders))).into_response())
}
