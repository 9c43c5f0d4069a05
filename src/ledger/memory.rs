//! In-process ledger store
//!
//! Same semantics as the PostgreSQL store, with one mutex standing in for
//! row locks. Used by tests and by runs without a configured database.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::error::LedgerError;
use super::store::{
    ApplyOutcome, ClaimedOrder, LedgerStore, OrderClaim, SubmitOutcome, UserCredentials,
    UserStore, WithdrawOutcome, credited_balance, guard_transition,
};
use crate::models::{
    Balance, Order, OrderStatus, OrderTransition, OrderUpdate, UserId, Withdrawal,
    to_ledger_amount,
};
use crate::validation::OrderNumber;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct LedgerState {
    next_user_id: UserId,
    users: HashMap<String, UserCredentials>,
    balances: HashMap<UserId, Decimal>,
    /// Insertion order is upload order
    orders: Vec<Order>,
    withdrawals: Vec<Withdrawal>,
}

impl LedgerState {
    fn apply(&mut self, number: &str, transition: &OrderTransition) -> Result<ApplyOutcome, LedgerError> {
        let idx = self
            .orders
            .iter()
            .position(|o| o.number == number)
            .ok_or_else(|| LedgerError::OrderNotFound(number.to_string()))?;

        let (owner, current) = (self.orders[idx].user_id, self.orders[idx].status);
        if let Some(outcome) = guard_transition(current, transition.status)? {
            return Ok(outcome);
        }

        if transition.status == OrderStatus::Processed {
            let credit = transition.credit();
            let current = *self
                .balances
                .get(&owner)
                .ok_or(LedgerError::BalanceMissing(owner))?;
            let updated = credited_balance(owner, current, credit)?;
            self.balances.insert(owner, updated);
            self.orders[idx].accrual = Some(credit);
        }
        self.orders[idx].status = transition.status;

        Ok(ApplyOutcome::Applied)
    }
}

/// In-memory [`LedgerStore`] and [`UserStore`]
#[derive(Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    claimed: Arc<Mutex<HashSet<String>>>,
    claims_made: AtomicUsize,
    /// Claims still to fail with a timeout
    failing_claims: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` claim attempts fail with [`LedgerError::Timeout`]
    pub fn fail_next_claims(&self, count: usize) {
        self.failing_claims.store(count, Ordering::SeqCst);
    }

    /// Number of claims handed out so far
    pub fn claims_made(&self) -> usize {
        self.claims_made.load(Ordering::SeqCst)
    }

    /// Number of claims currently held
    pub fn active_claims(&self) -> usize {
        lock(&self.claimed).len()
    }

    pub fn order(&self, number: &str) -> Option<Order> {
        lock(&self.state)
            .orders
            .iter()
            .find(|o| o.number == number)
            .cloned()
    }

    pub fn order_count(&self) -> usize {
        lock(&self.state).orders.len()
    }

    /// Orders not yet PROCESSED or INVALID
    pub fn pending_count(&self) -> usize {
        lock(&self.state)
            .orders
            .iter()
            .filter(|o| !o.status.is_terminal())
            .count()
    }
}

/// Claim on a [`MemoryLedger`] order; the hold is dropped with the claim
pub struct MemoryClaim {
    state: Arc<Mutex<LedgerState>>,
    claimed: Arc<Mutex<HashSet<String>>>,
    order: ClaimedOrder,
    finished: bool,
}

impl MemoryClaim {
    fn finish(&mut self) -> Result<(), LedgerError> {
        if self.finished {
            return Err(LedgerError::ClaimFinished);
        }
        self.finished = true;
        lock(&self.claimed).remove(&self.order.number);
        Ok(())
    }
}

impl Drop for MemoryClaim {
    fn drop(&mut self) {
        if !self.finished {
            lock(&self.claimed).remove(&self.order.number);
        }
    }
}

#[async_trait]
impl OrderClaim for MemoryClaim {
    fn order(&self) -> &ClaimedOrder {
        &self.order
    }

    async fn apply(&mut self, transition: OrderTransition) -> Result<ApplyOutcome, LedgerError> {
        if self.finished {
            return Err(LedgerError::ClaimFinished);
        }
        let outcome = lock(&self.state).apply(&self.order.number, &transition);
        self.finish()?;
        let outcome = outcome?;
        if outcome == ApplyOutcome::Applied {
            self.order.status = transition.status;
        }
        Ok(outcome)
    }

    async fn release(&mut self) -> Result<(), LedgerError> {
        self.finish()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn submit_order(
        &self,
        user_id: UserId,
        number: &OrderNumber,
    ) -> Result<SubmitOutcome, LedgerError> {
        let mut state = lock(&self.state);
        if let Some(existing) = state.orders.iter().find(|o| o.number == number.as_str()) {
            return Ok(if existing.user_id == user_id {
                SubmitOutcome::AlreadyOwned
            } else {
                SubmitOutcome::OwnedByOther
            });
        }

        state.orders.push(Order {
            number: number.to_string(),
            user_id,
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc::now(),
        });
        Ok(SubmitOutcome::Created)
    }

    async fn orders_of(&self, user_id: UserId) -> Result<Vec<Order>, LedgerError> {
        Ok(lock(&self.state)
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn claim_next_pending(
        &self,
        status: OrderStatus,
        skip: &[String],
    ) -> Result<Option<Box<dyn OrderClaim>>, LedgerError> {
        let failing = self.failing_claims.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_claims.store(failing - 1, Ordering::SeqCst);
            return Err(LedgerError::Timeout);
        }

        let state = lock(&self.state);
        let mut claimed = lock(&self.claimed);

        let next = state.orders.iter().find(|o| {
            o.status == status && !skip.contains(&o.number) && !claimed.contains(&o.number)
        });
        let Some(order) = next else {
            return Ok(None);
        };

        claimed.insert(order.number.clone());
        self.claims_made.fetch_add(1, Ordering::SeqCst);

        Ok(Some(Box::new(MemoryClaim {
            state: Arc::clone(&self.state),
            claimed: Arc::clone(&self.claimed),
            order: ClaimedOrder {
                number: order.number.clone(),
                user_id: order.user_id,
                status: order.status,
            },
            finished: false,
        })))
    }

    async fn apply_order_result(&self, update: &OrderUpdate) -> Result<ApplyOutcome, LedgerError> {
        lock(&self.state).apply(&update.number, &update.transition)
    }

    async fn withdraw(
        &self,
        user_id: UserId,
        reference: &OrderNumber,
        amount: Decimal,
    ) -> Result<WithdrawOutcome, LedgerError> {
        let amount = to_ledger_amount(amount);
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut state = lock(&self.state);
        let current = *state
            .balances
            .get(&user_id)
            .ok_or(LedgerError::BalanceMissing(user_id))?;

        if current < amount {
            return Ok(WithdrawOutcome::InsufficientFunds);
        }
        if state.withdrawals.iter().any(|w| w.order == reference.as_str()) {
            return Err(LedgerError::DuplicateWithdrawal(reference.to_string()));
        }

        state.balances.insert(user_id, current - amount);
        state.withdrawals.push(Withdrawal {
            order: reference.to_string(),
            user_id,
            sum: amount,
            processed_at: Utc::now(),
        });
        Ok(WithdrawOutcome::Accepted)
    }

    async fn balance_of(&self, user_id: UserId) -> Result<Balance, LedgerError> {
        let state = lock(&self.state);
        let current = *state
            .balances
            .get(&user_id)
            .ok_or(LedgerError::BalanceMissing(user_id))?;
        let withdrawn = state
            .withdrawals
            .iter()
            .filter(|w| w.user_id == user_id)
            .map(|w| w.sum)
            .sum();
        Ok(Balance { current, withdrawn })
    }

    async fn withdrawals_of(&self, user_id: UserId) -> Result<Vec<Withdrawal>, LedgerError> {
        Ok(lock(&self.state)
            .withdrawals
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryLedger {
    async fn create_user(
        &self,
        login: &str,
        password_hash: &str,
    ) -> Result<Option<UserId>, LedgerError> {
        let mut state = lock(&self.state);
        if state.users.contains_key(login) {
            return Ok(None);
        }

        state.next_user_id += 1;
        let user_id = state.next_user_id;
        state.users.insert(
            login.to_string(),
            UserCredentials {
                user_id,
                password_hash: password_hash.to_string(),
            },
        );
        state.balances.insert(user_id, Decimal::ZERO);
        Ok(Some(user_id))
    }

    async fn find_credentials(&self, login: &str) -> Result<Option<UserCredentials>, LedgerError> {
        Ok(lock(&self.state).users.get(login).cloned())
    }
}
