//! PostgreSQL ledger store
//!
//! Every mutating operation runs in one `sqlx::Transaction`: commit on full
//! success, rollback on any early return (the transaction rolls back on drop).
//! Both the settlement credit and the withdrawal debit lock the owner's
//! `balances` row with `SELECT ... FOR UPDATE` before touching it.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};

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

/// Ledger store backed by PostgreSQL
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_from_row(row: &PgRow) -> Result<OrderStatus, LedgerError> {
    let id: i16 = row.try_get("status")?;
    OrderStatus::from_id(id).ok_or_else(|| LedgerError::Corrupt(format!("order status id {}", id)))
}

fn row_to_order(row: &PgRow) -> Result<Order, LedgerError> {
    Ok(Order {
        number: row.try_get("order_number")?,
        user_id: row.try_get("user_id")?,
        status: status_from_row(row)?,
        accrual: row.try_get("accrual")?,
        uploaded_at: row.try_get("uploaded_at")?,
    })
}

fn row_to_withdrawal(row: &PgRow) -> Result<Withdrawal, LedgerError> {
    Ok(Withdrawal {
        order: row.try_get("order_ref")?,
        user_id: row.try_get("user_id")?,
        sum: row.try_get("amount")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_check_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_check_violation())
}

/// Lock the order row, re-check its status, and write the transition.
///
/// Runs on a connection that is inside a transaction; the caller commits
/// only when `Applied` comes back.
async fn apply_locked(
    conn: &mut PgConnection,
    number: &str,
    transition: &OrderTransition,
) -> Result<ApplyOutcome, LedgerError> {
    let row = sqlx::query("SELECT user_id, status FROM orders WHERE order_number = $1 FOR UPDATE")
        .bind(number)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| LedgerError::OrderNotFound(number.to_string()))?;

    let owner: UserId = row.try_get("user_id")?;
    let current = status_from_row(&row)?;

    if let Some(outcome) = guard_transition(current, transition.status)? {
        return Ok(outcome);
    }

    if transition.status != OrderStatus::Processed {
        sqlx::query("UPDATE orders SET status = $1 WHERE order_number = $2")
            .bind(transition.status.id())
            .bind(number)
            .execute(&mut *conn)
            .await?;
        return Ok(ApplyOutcome::Applied);
    }

    let credit = transition.credit();
    let current: Decimal =
        sqlx::query_scalar("SELECT current_amount FROM balances WHERE user_id = $1 FOR UPDATE")
            .bind(owner)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(LedgerError::BalanceMissing(owner))?;
    let updated = credited_balance(owner, current, credit)?;

    sqlx::query("UPDATE orders SET status = $1, accrual = $2 WHERE order_number = $3")
        .bind(transition.status.id())
        .bind(credit)
        .bind(number)
        .execute(&mut *conn)
        .await?;

    sqlx::query("UPDATE balances SET current_amount = $1 WHERE user_id = $2")
        .bind(updated)
        .bind(owner)
        .execute(&mut *conn)
        .await?;

    Ok(ApplyOutcome::Applied)
}

/// Claim holding an open transaction with the order row locked
pub struct PgOrderClaim {
    tx: Option<Transaction<'static, Postgres>>,
    order: ClaimedOrder,
}

#[async_trait]
impl OrderClaim for PgOrderClaim {
    fn order(&self) -> &ClaimedOrder {
        &self.order
    }

    async fn apply(&mut self, transition: OrderTransition) -> Result<ApplyOutcome, LedgerError> {
        let mut tx = self.tx.take().ok_or(LedgerError::ClaimFinished)?;
        let outcome = apply_locked(&mut *tx, &self.order.number, &transition).await?;
        if outcome == ApplyOutcome::Applied {
            tx.commit().await?;
            self.order.status = transition.status;
        } else {
            tx.rollback().await?;
        }
        Ok(outcome)
    }

    async fn release(&mut self) -> Result<(), LedgerError> {
        let tx = self.tx.take().ok_or(LedgerError::ClaimFinished)?;
        tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn submit_order(
        &self,
        user_id: UserId,
        number: &OrderNumber,
    ) -> Result<SubmitOutcome, LedgerError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (order_number, user_id, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (order_number) DO NOTHING
            "#,
        )
        .bind(number.as_str())
        .bind(user_id)
        .bind(OrderStatus::New.id())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            return Ok(SubmitOutcome::Created);
        }

        let owner: UserId =
            sqlx::query_scalar("SELECT user_id FROM orders WHERE order_number = $1")
                .bind(number.as_str())
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| LedgerError::OrderNotFound(number.to_string()))?;

        if owner == user_id {
            Ok(SubmitOutcome::AlreadyOwned)
        } else {
            Ok(SubmitOutcome::OwnedByOther)
        }
    }

    async fn orders_of(&self, user_id: UserId) -> Result<Vec<Order>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT order_number, user_id, status, accrual, uploaded_at
            FROM orders
            WHERE user_id = $1
            ORDER BY uploaded_at ASC, order_number ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order).collect()
    }

    async fn claim_next_pending(
        &self,
        status: OrderStatus,
        skip: &[String],
    ) -> Result<Option<Box<dyn OrderClaim>>, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT order_number, user_id, status
            FROM orders
            WHERE status = $1 AND NOT (order_number = ANY($2))
            ORDER BY uploaded_at
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(status.id())
        .bind(skip)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let order = ClaimedOrder {
            number: row.try_get("order_number")?,
            user_id: row.try_get("user_id")?,
            status: status_from_row(&row)?,
        };

        Ok(Some(Box::new(PgOrderClaim {
            tx: Some(tx),
            order,
        })))
    }

    async fn apply_order_result(&self, update: &OrderUpdate) -> Result<ApplyOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let outcome = apply_locked(&mut *tx, &update.number, &update.transition).await?;
        if outcome == ApplyOutcome::Applied {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        Ok(outcome)
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

        let mut tx = self.pool.begin().await?;

        let current: Decimal =
            sqlx::query_scalar("SELECT current_amount FROM balances WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(LedgerError::BalanceMissing(user_id))?;

        if current < amount {
            tx.rollback().await?;
            return Ok(WithdrawOutcome::InsufficientFunds);
        }

        let debit =
            sqlx::query("UPDATE balances SET current_amount = current_amount - $1 WHERE user_id = $2")
                .bind(amount)
                .bind(user_id)
                .execute(&mut *tx)
                .await;
        match debit {
            Err(e) if is_check_violation(&e) => {
                tracing::warn!(user_id, %amount, "Balance check constraint rejected debit");
                return Ok(WithdrawOutcome::InsufficientFunds);
            }
            other => {
                other?;
            }
        }

        let recorded = sqlx::query(
            "INSERT INTO withdrawals (order_ref, user_id, amount) VALUES ($1, $2, $3)",
        )
        .bind(reference.as_str())
        .bind(user_id)
        .bind(amount)
        .execute(&mut *tx)
        .await;
        match recorded {
            Err(e) if is_unique_violation(&e) => {
                return Err(LedgerError::DuplicateWithdrawal(reference.to_string()));
            }
            other => {
                other?;
            }
        }

        tx.commit().await?;
        Ok(WithdrawOutcome::Accepted)
    }

    async fn balance_of(&self, user_id: UserId) -> Result<Balance, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT b.current_amount,
                   COALESCE((SELECT SUM(w.amount) FROM withdrawals w WHERE w.user_id = b.user_id), 0)
                       AS withdrawn
            FROM balances b
            WHERE b.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::BalanceMissing(user_id))?;

        Ok(Balance {
            current: row.try_get("current_amount")?,
            withdrawn: row.try_get("withdrawn")?,
        })
    }

    async fn withdrawals_of(&self, user_id: UserId) -> Result<Vec<Withdrawal>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT order_ref, user_id, amount, processed_at
            FROM withdrawals
            WHERE user_id = $1
            ORDER BY processed_at ASC, order_ref ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_withdrawal).collect()
    }
}

#[async_trait]
impl UserStore for PgLedger {
    async fn create_user(
        &self,
        login: &str,
        password_hash: &str,
    ) -> Result<Option<UserId>, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let user_id: Option<UserId> = sqlx::query_scalar(
            r#"
            INSERT INTO users (login, password_hash)
            VALUES ($1, $2)
            ON CONFLICT (login) DO NOTHING
            RETURNING user_id
            "#,
        )
        .bind(login)
        .bind(password_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = user_id else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query("INSERT INTO balances (user_id) VALUES ($1)")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(user_id))
    }

    async fn find_credentials(&self, login: &str) -> Result<Option<UserCredentials>, LedgerError> {
        let row = sqlx::query("SELECT user_id, password_hash FROM users WHERE login = $1")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(UserCredentials {
                user_id: row.try_get("user_id")?,
                password_hash: row.try_get("password_hash")?,
            })),
            None => Ok(None),
        }
    }
}
