use crate::models::{OrderStatus, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Balance row missing for user {0}")]
    BalanceMissing(UserId),

    #[error("Withdrawal reference already used: {0}")]
    DuplicateWithdrawal(String),

    #[error("Invalid withdrawal amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Accrual outside the ledger range: {0}")]
    InvalidAccrual(Decimal),

    #[error("Balance of user {0} would exceed the ledger range")]
    BalanceOverflow(UserId),

    #[error("Invalid order transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Claim already committed or released")]
    ClaimFinished,

    #[error("Ledger operation timed out")]
    Timeout,

    #[error("Corrupt ledger row: {0}")]
    Corrupt(String),
}

impl From<tokio::time::error::Elapsed> for LedgerError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        LedgerError::Timeout
    }
}
