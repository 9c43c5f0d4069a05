//! Accrual system: the external settlement authority
//!
//! [`AccrualSource`] translates the upstream verdict for one order into an
//! [`AccrualOutcome`], or [`ScoreReply::RateLimited`] when upstream pushes back.

pub mod client;
pub mod mock;
pub mod types;

pub use client::HttpAccrualClient;
pub use mock::ScriptedAccrual;
pub use types::{AccrualError, AccrualOutcome, AccrualReply, AccrualSource, ScoreReply};
