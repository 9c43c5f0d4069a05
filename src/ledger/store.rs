//! Ledger store seams
//!
//! [`LedgerStore`] is the only path that mutates orders, balances and
//! withdrawals. Implementations: [`super::PgLedger`] (PostgreSQL) and
//! [`super::MemoryLedger`] (in-process, used by tests and storage-less runs).

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::error::LedgerError;
use crate::models::{
    Balance, MAX_LEDGER_AMOUNT, Order, OrderStatus, OrderTransition, OrderUpdate, UserId,
    Withdrawal,
};
use crate::validation::OrderNumber;

/// Result of inserting an order number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// New row inserted with status NEW
    Created,
    /// Number already exists and belongs to the submitter
    AlreadyOwned,
    /// Number already exists and belongs to someone else
    OwnedByOther,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawOutcome {
    Accepted,
    /// Balance below the requested amount, nothing written
    InsufficientFunds,
}

/// Result of applying a transition to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Status (and accrual/credit for PROCESSED) written and committed
    Applied,
    /// Target equals the current status, nothing written
    Unchanged,
    /// Order already PROCESSED or INVALID, nothing written
    AlreadyTerminal,
}

/// Order row held by a claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedOrder {
    pub number: String,
    pub user_id: UserId,
    pub status: OrderStatus,
}

#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: UserId,
    pub password_hash: String,
}

/// Exclusive hold on one pending order
///
/// The hold lasts until `apply` or `release` completes, or the claim is
/// dropped. Dropping without either rolls back.
#[async_trait]
pub trait OrderClaim: Send {
    fn order(&self) -> &ClaimedOrder;

    /// Write the transition inside the claim's transaction and commit
    async fn apply(&mut self, transition: OrderTransition) -> Result<ApplyOutcome, LedgerError>;

    /// Give the order back untouched
    async fn release(&mut self) -> Result<(), LedgerError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn submit_order(
        &self,
        user_id: UserId,
        number: &OrderNumber,
    ) -> Result<SubmitOutcome, LedgerError>;

    /// Orders of one user, oldest upload first
    async fn orders_of(&self, user_id: UserId) -> Result<Vec<Order>, LedgerError>;

    /// Claim the oldest order in `status` whose number is not in `skip`
    ///
    /// Orders held by another claim are passed over, never waited for.
    async fn claim_next_pending(
        &self,
        status: OrderStatus,
        skip: &[String],
    ) -> Result<Option<Box<dyn OrderClaim>>, LedgerError>;

    /// Apply a transition in a transaction of its own
    async fn apply_order_result(&self, update: &OrderUpdate) -> Result<ApplyOutcome, LedgerError>;

    async fn withdraw(
        &self,
        user_id: UserId,
        reference: &OrderNumber,
        amount: Decimal,
    ) -> Result<WithdrawOutcome, LedgerError>;

    async fn balance_of(&self, user_id: UserId) -> Result<Balance, LedgerError>;

    /// Withdrawals of one user, oldest first
    async fn withdrawals_of(&self, user_id: UserId) -> Result<Vec<Withdrawal>, LedgerError>;
}

/// Account storage used by registration and login
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create the user together with a zero balance.
    /// Returns `None` when the login is taken.
    async fn create_user(
        &self,
        login: &str,
        password_hash: &str,
    ) -> Result<Option<UserId>, LedgerError>;

    async fn find_credentials(&self, login: &str) -> Result<Option<UserCredentials>, LedgerError>;
}

/// Decide whether `current -> target` needs a write.
///
/// `Ok(None)` means write; `Ok(Some(_))` is the benign outcome to report
/// without touching the row. A terminal order is never rewritten, which is
/// what keeps settlement to a single credit.
pub fn guard_transition(
    current: OrderStatus,
    target: OrderStatus,
) -> Result<Option<ApplyOutcome>, LedgerError> {
    if current.is_terminal() {
        return Ok(Some(ApplyOutcome::AlreadyTerminal));
    }
    if current == target {
        return Ok(Some(ApplyOutcome::Unchanged));
    }
    if target == OrderStatus::New {
        return Err(LedgerError::InvalidTransition {
            from: current,
            to: target,
        });
    }
    Ok(None)
}

/// Owner balance after crediting `credit` onto `current`
///
/// Negative credits are refused; the sum must stay below [`MAX_LEDGER_AMOUNT`].
pub fn credited_balance(
    owner: UserId,
    current: Decimal,
    credit: Decimal,
) -> Result<Decimal, LedgerError> {
    if credit < Decimal::ZERO || credit >= MAX_LEDGER_AMOUNT {
        return Err(LedgerError::InvalidAccrual(credit));
    }
    current
        .checked_add(credit)
        .filter(|balance| *balance < MAX_LEDGER_AMOUNT)
        .ok_or(LedgerError::BalanceOverflow(owner))
}
