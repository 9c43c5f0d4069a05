//! HTTP gateway
//!
//! ```text
//! /api/health                  public
//! /api/user/register, /login   public
//! /api/user/orders ...         JWT (jwt_auth_middleware)
//! ```

pub mod error;
pub mod handlers;
pub mod state;
pub mod types;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::user_auth;
use state::AppState;

/// Build the complete router
pub fn build_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(user_auth::handlers::register))
        .route("/login", post(user_auth::handlers::login));

    let user_routes = Router::new()
        .route(
            "/orders",
            post(handlers::upload_order).get(handlers::list_orders),
        )
        .route("/balance", get(handlers::get_balance))
        .route("/balance/withdraw", post(handlers::withdraw))
        .route("/withdrawals", get(handlers::list_withdrawals))
        .route_layer(from_fn_with_state(
            state.clone(),
            user_auth::jwt_auth_middleware,
        ));

    Router::new()
        .route("/api/health", get(handlers::health_check))
        .nest("/api/user", auth_routes.merge(user_routes))
        .with_state(state)
}

/// Serve `app` on `addr` until `shutdown` resolves
pub async fn run_server<F>(addr: &str, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Gateway listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
