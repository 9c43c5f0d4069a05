//! Order intake and withdrawal requests
//!
//! Raw caller input is validated here, then handed to the ledger. Conflicts
//! come back as typed results; only storage failures are errors.

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::ledger::{LedgerError, LedgerStore, SubmitOutcome, WithdrawOutcome};
use crate::models::{UserId, to_ledger_amount};
use crate::validation::{OrderNumber, OrderNumberError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    AcceptedNew,
    /// Same user submitted the same number before
    AcceptedDuplicateOwn,
    /// Number belongs to another user
    ConflictOtherOwner,
    Malformed(OrderNumberError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalResult {
    Accepted,
    InsufficientFunds,
    MalformedReference(OrderNumberError),
    /// Zero or negative after rounding to cents
    InvalidAmount(Decimal),
}

/// Validate `raw` and register it as an order of `user_id`
pub async fn submit_order(
    store: &dyn LedgerStore,
    user_id: UserId,
    raw: &str,
) -> Result<SubmissionResult, LedgerError> {
    let number = match OrderNumber::parse(raw) {
        Ok(number) => number,
        Err(e) => return Ok(SubmissionResult::Malformed(e)),
    };

    let result = match store.submit_order(user_id, &number).await? {
        SubmitOutcome::Created => {
            info!(order = %number, user_id, "Order accepted");
            SubmissionResult::AcceptedNew
        }
        SubmitOutcome::AlreadyOwned => SubmissionResult::AcceptedDuplicateOwn,
        SubmitOutcome::OwnedByOther => {
            warn!(order = %number, user_id, "Order number owned by another user");
            SubmissionResult::ConflictOtherOwner
        }
    };
    Ok(result)
}

/// Validate the reference and amount, then debit `user_id`
pub async fn request_withdrawal(
    store: &dyn LedgerStore,
    user_id: UserId,
    raw_reference: &str,
    amount: Decimal,
) -> Result<WithdrawalResult, LedgerError> {
    let reference = match OrderNumber::parse(raw_reference) {
        Ok(reference) => reference,
        Err(e) => return Ok(WithdrawalResult::MalformedReference(e)),
    };

    let amount = to_ledger_amount(amount);
    if amount <= Decimal::ZERO {
        return Ok(WithdrawalResult::InvalidAmount(amount));
    }

    let result = match store.withdraw(user_id, &reference, amount).await? {
        WithdrawOutcome::Accepted => {
            info!(reference = %reference, user_id, %amount, "Withdrawal recorded");
            WithdrawalResult::Accepted
        }
        WithdrawOutcome::InsufficientFunds => WithdrawalResult::InsufficientFunds,
    };
    Ok(result)
}
