//! Loyalty Mart - loyalty points ledger
//!
//! Users upload order numbers; a background reconciler asks the external
//! accrual system how many points each order earns and credits them; users
//! spend points through withdrawals.
//!
//! # Modules
//!
//! - [`models`] - Order, Balance, Withdrawal and the order lifecycle
//! - [`validation`] - Luhn-checked order numbers
//! - [`ledger`] - Transactional store (PostgreSQL and in-memory)
//! - [`accrual`] - Accrual system client
//! - [`reconciler`] - Background worker settling pending orders
//! - [`submission`] - Order upload and withdrawal requests
//! - [`user_auth`] - Registration, login, JWT
//! - [`gateway`] - HTTP API
//! - [`config`], [`logging`], [`db`] - Process plumbing

pub mod accrual;
pub mod config;
pub mod db;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod reconciler;
pub mod submission;
pub mod user_auth;
pub mod validation;

// Convenient re-exports at crate root
pub use accrual::{AccrualOutcome, AccrualSource, HttpAccrualClient, ScoreReply};
pub use ledger::{LedgerError, LedgerStore, MemoryLedger, PgLedger};
pub use models::{Balance, Order, OrderStatus, OrderTransition, OrderUpdate, UserId, Withdrawal};
pub use reconciler::{ReconcileWorker, ReconcilerHandle, WorkerConfig};
pub use validation::OrderNumber;
