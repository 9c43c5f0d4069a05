use thiserror::Error;

use crate::accrual::AccrualError;
use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Accrual error: {0}")]
    Accrual(#[from] AccrualError),

    #[error("Reconciler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
