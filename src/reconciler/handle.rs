use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use super::error::ReconcileError;
use super::worker::ReconcileWorker;

/// Owner of a running [`ReconcileWorker`] task
///
/// The stop request is honoured between orders and during sleeps, never
/// inside an open claim.
pub struct ReconcilerHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Spawn the worker on the current runtime
    pub fn spawn(worker: ReconcileWorker) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(worker.run(stop_rx));
        Self { stop_tx, join }
    }

    pub fn request_stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Request a stop and wait for the worker to finish
    pub async fn stop(self) -> Result<(), ReconcileError> {
        self.request_stop();
        self.join.await?;
        info!("Reconciler shut down");
        Ok(())
    }
}
