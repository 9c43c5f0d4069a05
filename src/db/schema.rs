//! Idempotent schema bootstrap, run once at startup

use sqlx::PgPool;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id       BIGSERIAL PRIMARY KEY,
        login         TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT users_login_uindex UNIQUE (login)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS balances (
        user_id        BIGINT PRIMARY KEY REFERENCES users (user_id),
        current_amount NUMERIC(14, 2) NOT NULL DEFAULT 0,
        CONSTRAINT balances_nonnegative CHECK (current_amount >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        order_number TEXT PRIMARY KEY,
        user_id      BIGINT NOT NULL REFERENCES users (user_id),
        status       SMALLINT NOT NULL DEFAULT 0,
        accrual      NUMERIC(14, 2),
        uploaded_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS orders_user_idx ON orders (user_id, uploaded_at)",
    "CREATE INDEX IF NOT EXISTS orders_pending_idx ON orders (status, uploaded_at)",
    r#"
    CREATE TABLE IF NOT EXISTS withdrawals (
        order_ref    TEXT PRIMARY KEY,
        user_id      BIGINT NOT NULL REFERENCES users (user_id),
        amount       NUMERIC(14, 2) NOT NULL,
        processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT withdrawals_positive CHECK (amount > 0)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS withdrawals_user_idx ON withdrawals (user_id, processed_at)",
];

/// Create tables and indexes that do not exist yet, in one transaction
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    tracing::info!(statements = SCHEMA.len(), "Database schema ready");
    Ok(())
}
