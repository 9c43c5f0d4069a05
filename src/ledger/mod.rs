//! Ledger store: orders, balances, withdrawals and users
//!
//! All balance-affecting writes happen here, each inside a single
//! transaction scope:
//!
//! ```text
//! submit_order ──▶ orders(NEW)
//! claim_next_pending ──▶ claim.apply ──▶ orders(status, accrual) + balances(+credit)
//! withdraw ──▶ balances(-debit) + withdrawals
//! ```

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::LedgerError;
pub use memory::MemoryLedger;
pub use postgres::PgLedger;
pub use store::{
    ApplyOutcome, ClaimedOrder, LedgerStore, OrderClaim, SubmitOutcome, UserCredentials,
    UserStore, WithdrawOutcome,
};

use std::future::Future;
use std::time::Duration;

/// Bound a fallible future by `limit`; expiry becomes the caller's timeout error.
///
/// Dropping the future on expiry drops any transaction it holds, which
/// rolls it back.
pub async fn with_deadline<T, E, F>(limit: Duration, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<tokio::time::error::Elapsed>,
{
    tokio::time::timeout(limit, fut).await?
}
