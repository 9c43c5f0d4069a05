//! Loyalty Mart server
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌────────────┐    ┌──────────┐
//! │ Gateway  │───▶│  Ledger  │◀───│ Reconciler │───▶│ Accrual  │
//! │ (axum)   │    │ (PG/mem) │    │  (worker)  │    │ (HTTP)   │
//! └──────────┘    └──────────┘    └────────────┘    └──────────┘
//! ```
//!
//! Flags: `-e <env>` `-a <run address>` `-d <database uri>` `-r <accrual address>`

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use loyalty_mart::accrual::HttpAccrualClient;
use loyalty_mart::config::{AppConfig, CliOverrides, DEFAULT_JWT_SECRET};
use loyalty_mart::db::{Database, schema};
use loyalty_mart::gateway::{self, state::AppState};
use loyalty_mart::ledger::{LedgerStore, MemoryLedger, PgLedger, UserStore};
use loyalty_mart::reconciler::{ReconcileWorker, ReconcilerHandle, WorkerConfig};
use loyalty_mart::user_auth::UserAuthService;

type Stores = (Arc<dyn LedgerStore>, Arc<dyn UserStore>, Option<Arc<Database>>);

async fn open_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    match &config.database.url {
        Some(url) => {
            let db = Database::connect(url, &config.database)
                .await
                .context("Failed to connect to PostgreSQL")?;
            schema::init_schema(db.pool())
                .await
                .context("Failed to initialise schema")?;
            let pg = Arc::new(PgLedger::new(db.pool().clone()));
            let ledger: Arc<dyn LedgerStore> = pg.clone();
            let users: Arc<dyn UserStore> = pg;
            Ok((ledger, users, Some(Arc::new(db))))
        }
        None => {
            tracing::warn!("No database configured, using the in-memory ledger (data is lost on exit)");
            let memory = Arc::new(MemoryLedger::new());
            let ledger: Arc<dyn LedgerStore> = memory.clone();
            let users: Arc<dyn UserStore> = memory;
            Ok((ledger, users, None))
        }
    }
}

fn start_reconciler(
    config: &AppConfig,
    ledger: Arc<dyn LedgerStore>,
) -> anyhow::Result<Option<ReconcilerHandle>> {
    let Some(address) = &config.accrual.address else {
        tracing::warn!("No accrual system address configured, reconciler disabled");
        return Ok(None);
    };

    let client = HttpAccrualClient::new(
        address,
        Duration::from_millis(config.accrual.request_timeout_ms),
    )
    .context("Failed to build accrual client")?;
    tracing::info!(accrual = client.base_url(), "Accrual system configured");

    let worker = ReconcileWorker::new(
        ledger,
        Arc::new(client),
        WorkerConfig::from(&config.reconciler),
    );
    Ok(Some(ReconcilerHandle::spawn(worker)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let overrides = CliOverrides::from_args(std::env::args().skip(1))?;
    let mut app_config = AppConfig::load(&overrides.env)?;
    overrides.apply(&mut app_config);
    app_config.apply_env(|key| std::env::var(key).ok());
    app_config.validate()?;

    let _log_guard = loyalty_mart::logging::init_logging(&app_config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        env = %overrides.env,
        "Starting Loyalty Mart"
    );
    if app_config.auth.jwt_secret == DEFAULT_JWT_SECRET {
        tracing::warn!("Using the built-in JWT secret; set JWT_SECRET in production");
    }

    let (ledger, users, db) = open_stores(&app_config).await?;

    let reconciler = start_reconciler(&app_config, ledger.clone())?;

    let user_auth = Arc::new(UserAuthService::new(
        users,
        app_config.auth.jwt_secret.clone(),
        chrono::Duration::hours(app_config.auth.token_ttl_hours),
    ));
    let state = Arc::new(AppState::new(
        ledger,
        user_auth,
        db,
        Duration::from_millis(app_config.server.request_timeout_ms),
    ));
    let app = gateway::build_router(state);

    let served = gateway::run_server(&app_config.server.run_address, app, shutdown_signal())
        .await
        .with_context(|| format!("Gateway failed on {}", app_config.server.run_address));

    if let Some(handle) = reconciler {
        handle.stop().await?;
    }

    served
}
