use std::sync::Arc;
use std::time::Duration;

use crate::db::Database;
use crate::ledger::LedgerStore;
use crate::user_auth::UserAuthService;

/// Gateway application state (shared)
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub user_auth: Arc<UserAuthService>,
    /// PostgreSQL pool for health checks; `None` on the in-memory ledger
    pub db: Option<Arc<Database>>,
    /// Bound on each ledger call made by a handler
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        user_auth: Arc<UserAuthService>,
        db: Option<Arc<Database>>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            user_auth,
            db,
            request_timeout,
        }
    }
}
