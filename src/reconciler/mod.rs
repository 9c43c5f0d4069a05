//! Background reconciliation of pending orders against the accrual system

pub mod error;
pub mod handle;
pub mod worker;

pub use error::ReconcileError;
pub use handle::ReconcilerHandle;
pub use worker::{CycleReport, ReconcileWorker, WorkerConfig};
