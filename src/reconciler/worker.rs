//! Reconciliation worker
//!
//! Drives every NEW/PROCESSING order toward PROCESSED or INVALID by asking
//! the accrual system about one claimed order at a time.
//!
//! ```text
//! ┌─ cycle ─────────────────────────────────────────────────┐
//! │ for class in [NEW, PROCESSING]:                         │
//! │   claim ─▶ get_score ─▶ claim.apply (commit) / release  │
//! │ rate limited ─▶ sleep cool-down                         │
//! │ error        ─▶ sleep back-off (claim rolled back)      │
//! │ drained      ─▶ sleep poll interval                     │
//! └─────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::error::ReconcileError;
use crate::accrual::{AccrualSource, ScoreReply};
use crate::config::ReconcilerConfig;
use crate::ledger::{ApplyOutcome, LedgerStore, OrderClaim, with_deadline};
use crate::models::OrderStatus;

/// Configuration for the reconciliation worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Pause after both classes were drained
    pub poll_interval: Duration,
    /// Pause after a storage or upstream failure
    pub error_backoff: Duration,
    /// Pause after the accrual system rate-limited us
    pub rate_limit_cooldown: Duration,
    /// Bound on each claim, accrual call and apply
    pub operation_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(1),
            rate_limit_cooldown: Duration::from_secs(60),
            operation_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&ReconcilerConfig> for WorkerConfig {
    fn from(config: &ReconcilerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            error_backoff: Duration::from_millis(config.error_backoff_ms),
            rate_limit_cooldown: Duration::from_millis(config.rate_limit_cooldown_ms),
            operation_timeout: Duration::from_millis(config.operation_timeout_ms),
        }
    }
}

/// Summary of one pass over the pending classes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Orders claimed and asked about
    pub checked: usize,
    /// Orders whose status changed
    pub updated: usize,
    /// Pass cut short by a rate-limit reply
    pub rate_limited: bool,
    /// Pass cut short by a stop request
    pub stopped: bool,
}

enum Step {
    Updated,
    Unchanged,
    RateLimited,
}

pub struct ReconcileWorker {
    store: Arc<dyn LedgerStore>,
    accrual: Arc<dyn AccrualSource>,
    config: WorkerConfig,
}

fn stop_requested(stop: Option<&watch::Receiver<bool>>) -> bool {
    // A dropped handle counts as a stop request.
    stop.is_some_and(|rx| *rx.borrow() || rx.has_changed().is_err())
}

impl ReconcileWorker {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        accrual: Arc<dyn AccrualSource>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            accrual,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run the worker until a stop is requested
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        info!(
            poll_interval = ?self.config.poll_interval,
            rate_limit_cooldown = ?self.config.rate_limit_cooldown,
            "Starting reconciliation worker"
        );

        loop {
            let pause = match self.cycle(Some(&stop)).await {
                Ok(report) if report.stopped => break,
                Ok(report) if report.rate_limited => {
                    warn!(
                        checked = report.checked,
                        updated = report.updated,
                        cooldown = ?self.config.rate_limit_cooldown,
                        "Accrual system rate limited, cooling down"
                    );
                    self.config.rate_limit_cooldown
                }
                Ok(report) => {
                    if report.checked > 0 {
                        debug!(
                            checked = report.checked,
                            updated = report.updated,
                            "Reconciliation pass finished"
                        );
                    }
                    self.config.poll_interval
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation pass aborted");
                    self.config.error_backoff
                }
            };

            if pause_or_stop(&mut stop, pause).await {
                break;
            }
        }

        info!("Reconciliation worker stopped");
    }

    /// One pass over NEW then PROCESSING
    pub async fn run_cycle(&self) -> Result<CycleReport, ReconcileError> {
        self.cycle(None).await
    }

    async fn cycle(
        &self,
        stop: Option<&watch::Receiver<bool>>,
    ) -> Result<CycleReport, ReconcileError> {
        let mut report = CycleReport::default();
        // Shared by both classes: an order promoted NEW -> PROCESSING waits for the next pass.
        let mut visited: Vec<String> = Vec::new();

        for class in OrderStatus::PENDING {
            loop {
                if stop_requested(stop) {
                    report.stopped = true;
                    return Ok(report);
                }

                let claim = with_deadline(
                    self.config.operation_timeout,
                    self.store.claim_next_pending(class, &visited),
                )
                .await?;
                let Some(mut claim) = claim else {
                    break;
                };

                visited.push(claim.order().number.clone());
                report.checked += 1;

                match self.reconcile_one(claim.as_mut()).await? {
                    Step::Updated => report.updated += 1,
                    Step::Unchanged => {}
                    Step::RateLimited => {
                        report.rate_limited = true;
                        return Ok(report);
                    }
                }
            }
        }

        Ok(report)
    }

    async fn reconcile_one(&self, claim: &mut dyn OrderClaim) -> Result<Step, ReconcileError> {
        let order = claim.order().clone();
        let timeout = self.config.operation_timeout;

        let reply = with_deadline(timeout, self.accrual.get_score(&order.number)).await?;
        let outcome = match reply {
            ScoreReply::RateLimited => {
                claim.release().await?;
                return Ok(Step::RateLimited);
            }
            ScoreReply::Scored(outcome) => outcome,
        };

        let transition = match outcome.transition() {
            Some(t) if t.status != order.status => t,
            _ => {
                claim.release().await?;
                debug!(order = %order.number, status = %order.status, "Order unchanged");
                return Ok(Step::Unchanged);
            }
        };

        match with_deadline(timeout, claim.apply(transition)).await? {
            ApplyOutcome::Applied => {
                info!(
                    order = %order.number,
                    user_id = order.user_id,
                    from = %order.status,
                    to = %transition.status,
                    accrual = ?transition.accrual,
                    "Order updated"
                );
                Ok(Step::Updated)
            }
            ApplyOutcome::Unchanged | ApplyOutcome::AlreadyTerminal => {
                debug!(order = %order.number, "Order already settled elsewhere");
                Ok(Step::Unchanged)
            }
        }
    }
}

/// Sleep for `pause`; returns true when a stop was requested meanwhile
async fn pause_or_stop(stop: &mut watch::Receiver<bool>, pause: Duration) -> bool {
    if stop_requested(Some(&*stop)) {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(pause) => false,
        _ = stop.wait_for(|stop| *stop) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accrual::{AccrualOutcome, ScriptedAccrual};
    use crate::ledger::{MemoryLedger, UserStore};
    use crate::validation::OrderNumber;
    use rust_decimal_macros::dec;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.error_backoff, Duration::from_secs(1));
        assert_eq!(config.rate_limit_cooldown, Duration::from_secs(60));
        assert_eq!(config.operation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_worker_config_from_section() {
        let section = ReconcilerConfig {
            poll_interval_ms: 250,
            error_backoff_ms: 500,
            rate_limit_cooldown_ms: 90_000,
            operation_timeout_ms: 5_000,
        };
        let config = WorkerConfig::from(&section);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.rate_limit_cooldown, Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_new_order_promoted_once_per_cycle() {
        let ledger = Arc::new(MemoryLedger::new());
        let user = ledger.create_user("alice", "hash").await.unwrap().unwrap();
        ledger
            .submit_order(user, &OrderNumber::parse("79927398713").unwrap())
            .await
            .unwrap();

        let accrual = Arc::new(ScriptedAccrual::always(AccrualOutcome::Pending));
        let worker = ReconcileWorker::new(ledger.clone(), accrual.clone(), WorkerConfig::default());

        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(accrual.calls(), 1, "promoted order waits for the next pass");
        assert_eq!(
            ledger.order("79927398713").unwrap().status,
            OrderStatus::Processing
        );

        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(accrual.calls(), 2);
    }

    #[tokio::test]
    async fn test_stop_signal_ends_cycle_before_claiming() {
        let ledger = Arc::new(MemoryLedger::new());
        let user = ledger.create_user("alice", "hash").await.unwrap().unwrap();
        ledger
            .submit_order(user, &OrderNumber::parse("79927398713").unwrap())
            .await
            .unwrap();

        let accrual = Arc::new(ScriptedAccrual::always(AccrualOutcome::Settled(dec!(1))));
        let worker = ReconcileWorker::new(ledger.clone(), accrual.clone(), WorkerConfig::default());

        let (tx, rx) = watch::channel(true);
        let report = worker.cycle(Some(&rx)).await.unwrap();
        assert!(report.stopped);
        assert_eq!(ledger.claims_made(), 0);
        drop(tx);
    }
}
