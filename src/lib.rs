//! Stockbook API Library
//!
//! Backend for a small record-keeping application: topics group dated
//! product records, sessions are cookie-based, and a batch-edit engine
//! reconciles client-side changes against the store.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod edit_session;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod migrator;
pub mod services;

use std::sync::Arc;

use axum::{
    response::Json,
    routing::{get, patch, post},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::auth::AuthService;
use crate::db::DbPool;
use crate::handlers::AppServices;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub auth: Arc<AuthService>,
    pub services: AppServices,
}

impl AppState {
    pub fn new(db: Arc<DbPool>, config: config::AppConfig) -> Self {
        let auth = Arc::new(AuthService::new(auth::AuthConfig {
            jwt_secret: config.jwt_secret.clone(),
            session_ttl: std::time::Duration::from_secs(config.jwt_expiration),
            remember_me_ttl: std::time::Duration::from_secs(config.remember_me_expiration),
        }));
        let services = AppServices::new(db.clone(), auth.clone());
        Self {
            db,
            config,
            auth,
            services,
        }
    }
}

async fn health_check(axum::extract::State(state): axum::extract::State<AppState>) -> Json<Value> {
    let db_ok = state.db.ping().await.is_ok();
    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": db_ok,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Builds the full application router. The auth middleware injects the
/// `AuthService` into request extensions so the `AuthUser` extractor can
/// validate session tokens without reaching into state.
pub fn app_router(state: AppState) -> Router {
    let auth_service = state.auth.clone();

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/forgot_password", post(handlers::auth::forgot_password))
        .route("/auth/reset_password", post(handlers::auth::reset_password))
        .route(
            "/topics",
            get(handlers::topics::list_topics).post(handlers::topics::create_topic),
        )
        .route(
            "/topics/:id",
            patch(handlers::topics::rename_topic).delete(handlers::topics::delete_topic),
        )
        .route(
            "/records",
            get(handlers::records::list_records).post(handlers::records::create_record),
        )
        .route(
            "/records/:id",
            patch(handlers::records::update_record).delete(handlers::records::delete_record),
        )
        .route("/stats", get(handlers::stats::stats_overview))
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            |axum::extract::State(auth): axum::extract::State<Arc<AuthService>>,
             mut req: axum::http::Request<axum::body::Body>,
             next: axum::middleware::Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ))
        .with_state(state)
}
