//! HTTP API tests over the in-memory ledger
//!
//! Requests go through the full router (JWT middleware included) with
//! `tower::ServiceExt::oneshot`; no socket is bound.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use loyalty_mart::gateway::{build_router, state::AppState};
use loyalty_mart::ledger::{LedgerStore, MemoryLedger};
use loyalty_mart::models::{OrderTransition, OrderUpdate};
use loyalty_mart::user_auth::UserAuthService;

struct TestApp {
    router: Router,
    ledger: Arc<MemoryLedger>,
}

impl TestApp {
    fn new() -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        let user_auth = Arc::new(UserAuthService::new(
            ledger.clone(),
            "test-secret".to_string(),
            chrono::Duration::hours(1),
        ));
        let state = Arc::new(AppState::new(
            ledger.clone(),
            user_auth,
            None,
            Duration::from_secs(5),
        ));
        Self {
            router: build_router(state),
            ledger,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Option<Value>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&bytes).unwrap())
        };
        (status, body)
    }

    async fn register(&self, login: &str) -> String {
        let (status, body) = self
            .send(json_request(
                "POST",
                "/api/user/register",
                None,
                json!({"login": login, "password": "secret"}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        body.unwrap()["data"]["token"].as_str().unwrap().to_string()
    }

    async fn upload(&self, token: &str, number: &str) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri("/api/user/orders")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(number.to_string()))
            .unwrap();
        self.send(request).await.0
    }

    async fn get(&self, token: &str, uri: &str) -> (StatusCode, Option<Value>) {
        let request = Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn settle(&self, number: &str, amount: rust_decimal::Decimal) {
        self.ledger
            .apply_order_result(&OrderUpdate::new(number, OrderTransition::processed(amount)))
            .await
            .unwrap();
    }
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_health_reports_memory_storage() {
    let app = TestApp::new();
    let (status, body) = app
        .send(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["data"]["storage"], "memory");
}

#[tokio::test]
async fn test_register_login_and_duplicate_login() {
    let app = TestApp::new();
    app.register("alice").await;

    let (status, _) = app
        .send(json_request(
            "POST",
            "/api/user/register",
            None,
            json!({"login": "alice", "password": "other"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/user/login",
            None,
            json!({"login": "alice", "password": "secret"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bearer = response.headers()[header::AUTHORIZATION].to_str().unwrap();
    assert!(bearer.starts_with("Bearer "));

    let (status, _) = app
        .send(json_request(
            "POST",
            "/api/user/login",
            None,
            json!({"login": "alice", "password": "wrong"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_register_body_is_bad_request() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("POST")
        .uri("/api/user/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"login\":"))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["code"], 1001);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = TestApp::new();
    let (status, body) = app
        .send(Request::builder().uri("/api/user/orders").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.unwrap()["code"], 2001);

    let (status, _) = app.get("not-a-jwt", "/api/user/balance").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_order_upload_status_codes() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    assert_eq!(app.upload(&alice, "79927398713").await, StatusCode::ACCEPTED);
    assert_eq!(app.upload(&alice, "79927398713").await, StatusCode::OK);
    assert_eq!(app.upload(&bob, "79927398713").await, StatusCode::CONFLICT);
    assert_eq!(
        app.upload(&bob, "79927398710").await,
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(app.upload(&bob, "12ab").await, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.upload(&bob, "   ").await, StatusCode::BAD_REQUEST);

    assert_eq!(app.ledger.order_count(), 1);
}

#[tokio::test]
async fn test_order_list_empty_then_filled() {
    let app = TestApp::new();
    let alice = app.register("alice").await;

    let (status, body) = app.get(&alice, "/api/user/orders").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_none());

    app.upload(&alice, "79927398713").await;
    app.upload(&alice, "12345678903").await;
    app.settle("79927398713", dec!(500.5)).await;

    let (status, body) = app.get(&alice, "/api/user/orders").await;
    assert_eq!(status, StatusCode::OK);
    let orders = body.unwrap()["data"].as_array().unwrap().clone();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["number"], "79927398713");
    assert_eq!(orders[0]["status"], "PROCESSED");
    assert_eq!(orders[0]["accrual"], 500.5);
    assert_eq!(orders[1]["status"], "NEW");
    assert!(orders[1].get("accrual").is_none());
    assert!(orders[0].get("user_id").is_none());
}

#[tokio::test]
async fn test_withdraw_flow() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    app.upload(&alice, "79927398713").await;
    app.settle("79927398713", dec!(100)).await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/api/user/balance/withdraw",
            Some(&alice),
            json!({"order": "2377225624", "sum": 150}),
        ))
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body.unwrap()["code"], 1002);

    let (status, _) = app
        .send(json_request(
            "POST",
            "/api/user/balance/withdraw",
            Some(&alice),
            json!({"order": "2377225625", "sum": 10}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app
        .send(json_request(
            "POST",
            "/api/user/balance/withdraw",
            Some(&alice),
            json!({"order": "2377225624", "sum": -5}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.get(&alice, "/api/user/withdrawals").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_none());

    let (status, _) = app
        .send(json_request(
            "POST",
            "/api/user/balance/withdraw",
            Some(&alice),
            json!({"order": "2377225624", "sum": 40.25}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get(&alice, "/api/user/balance").await;
    assert_eq!(status, StatusCode::OK);
    let balance = body.unwrap()["data"].clone();
    assert_eq!(balance["current"], 59.75);
    assert_eq!(balance["withdrawn"], 40.25);

    let (status, body) = app.get(&alice, "/api/user/withdrawals").await;
    assert_eq!(status, StatusCode::OK);
    let withdrawals = body.unwrap()["data"].as_array().unwrap().clone();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0]["order"], "2377225624");
    assert_eq!(withdrawals[0]["sum"], 40.25);
}

#[tokio::test]
async fn test_balances_are_per_user() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    app.upload(&alice, "79927398713").await;
    app.settle("79927398713", dec!(12.5)).await;

    let (_, body) = app.get(&bob, "/api/user/balance").await;
    let balance = body.unwrap()["data"].clone();
    assert_eq!(balance["current"], 0.0);
    assert_eq!(balance["withdrawn"], 0.0);

    let (status, _) = app.get(&bob, "/api/user/orders").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
