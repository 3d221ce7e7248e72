// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use stockbook_api::{config::AppConfig, db, entities::record, services::NewRecord, AppState};

/// Harness that spins up the full router on a fresh in-memory SQLite
/// database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "test_secret_key_for_testing_purposes_only".to_string(),
            3600,
            86_400,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single connection so every statement sees the same in-memory
        // database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg);
        let router = stockbook_api::app_router(state.clone());

        Self { router, state }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Register a fresh account and return a session token for it.
    pub async fn register_and_login(&self, email: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/auth/register",
                Some(json!({
                    "name": "Test User",
                    "email": email,
                    "password": "hunter22hunter22",
                })),
                None,
            )
            .await;
        assert_eq!(response.status(), axum::http::StatusCode::CREATED);

        let account = self
            .state
            .services
            .users
            .verify_credentials(email, "hunter22hunter22")
            .await
            .expect("credential check failed")
            .expect("registered account missing");
        self.state
            .auth
            .issue_session(&account, false)
            .expect("failed to issue session")
            .token
    }

    pub async fn seed_topic(&self, name: &str) -> Uuid {
        self.state
            .services
            .topics
            .create(name)
            .await
            .expect("failed to seed topic")
            .id
    }

    pub async fn seed_record(
        &self,
        topic_id: Uuid,
        date: NaiveDate,
        product_name: &str,
        amount: Decimal,
        unit: Decimal,
    ) -> record::Model {
        self.state
            .services
            .records
            .create(NewRecord {
                topic_id,
                date: Some(date),
                product_name: product_name.to_string(),
                color: Some("Red".to_string()),
                amount: Some(amount),
                unit: Some(unit),
            })
            .await
            .expect("failed to seed record")
    }
}

/// Read a response body as JSON.
pub async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response body is not valid json")
}
