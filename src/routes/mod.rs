use std::sync::Arc;

use axum::{routing::get, Router};

use crate::AppState;

pub mod admin;
pub mod auth;
pub mod health;
pub mod notifications;
pub mod preferences;
pub mod push;
pub mod webhooks;

/// Every route except `/webhooks`, which is nested separately so it can carry
/// its own rate limiter.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/notifications", notifications::router())
        .nest("/api/preferences", preferences::router())
        .nest("/api/push", push::router())
        .nest("/api/admin", admin::router())
}
