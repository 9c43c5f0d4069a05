//! Balance, withdrawals

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::super::error::ApiError;
use super::super::state::AppState;
use super::super::types::{ApiResponse, WithdrawRequest, error_codes};
use crate::ledger::with_deadline;
use crate::models::Balance;
use crate::submission::{WithdrawalResult, request_withdrawal};
use crate::user_auth::CurrentUser;

/// GET /api/user/balance
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Balance>>, ApiError> {
    let balance = with_deadline(state.request_timeout, state.ledger.balance_of(user.user_id)).await?;
    Ok(Json(ApiResponse::success(balance)))
}

/// Debit the balance against a payment reference
///
/// POST /api/user/balance/withdraw
///
/// - 200: recorded
/// - 402: not enough funds
/// - 422: reference fails the Luhn check
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;

    let result = with_deadline(
        state.request_timeout,
        request_withdrawal(state.ledger.as_ref(), user.user_id, &req.order, req.sum),
    )
    .await?;

    match result {
        WithdrawalResult::Accepted => {
            Ok((StatusCode::OK, Json(ApiResponse::success(()))).into_response())
        }
        WithdrawalResult::InsufficientFunds => Err(ApiError::new(
            StatusCode::PAYMENT_REQUIRED,
            error_codes::INSUFFICIENT_BALANCE,
            "Insufficient funds",
        )),
        WithdrawalResult::MalformedReference(e) => Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            error_codes::INVALID_ORDER_NUMBER,
            e.to_string(),
        )),
        WithdrawalResult::InvalidAmount(_) => {
            Err(ApiError::bad_request("Withdrawal sum must be positive"))
        }
    }
}

/// List the caller's withdrawals, oldest first
///
/// GET /api/user/withdrawals
pub async fn list_withdrawals(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Response, ApiError> {
    let withdrawals =
        with_deadline(state.request_timeout, state.ledger.withdrawals_of(user.user_id)).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok((StatusCode::OK, Json(ApiResponse::success(withdrawals))).into_response())
}
