use std::sync::Arc;

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use axum_extra::{headers::UserAgent, TypedHeader};
use serde::{Deserialize, Serialize};

use crate::db::models::{CreatePushSubscription, PushSubscription};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/vapid-public-key", get(vapid_public_key))
        .route(
            "/subscriptions",
            get(list_subscriptions)
                .post(create_subscription)
                .delete(delete_subscription),
        )
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct VapidKeyResponse {
    pub success: bool,
    pub public_key: String,
}

/// Shape of `PushSubscription.toJSON()` in the browser.
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

/// Subscription as returned to its owner. Keys stay server-side.
#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub id: String,
    pub endpoint: String,
    pub user_agent: Option<String>,
    pub is_active: bool,
    pub created_at: chrono::NaiveDateTime,
    pub last_used_at: Option<chrono::NaiveDateTime>,
}

impl From<PushSubscription> for SubscriptionResponse {
    fn from(s: PushSubscription) -> Self {
        Self {
            id: s.id,
            endpoint: s.endpoint,
            user_agent: s.user_agent,
            is_active: s.is_active,
            created_at: s.created_at,
            last_used_at: s.last_used_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubscriptionsResponse {
    pub success: bool,
    pub subscriptions: Vec<SubscriptionResponse>,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub success: bool,
    pub subscription: SubscriptionResponse,
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeResponse {
    pub success: bool,
    pub removed: bool,
}

// ============================================================================
// Handlers
// ============================================================================

async fn vapid_public_key(State(state): State<Arc<AppState>>) -> AppResult<Json<VapidKeyResponse>> {
    let key = state
        .push
        .vapid_public_key()
        .ok_or_else(|| AppError::ServiceUnavailable("Push notifications are not configured".to_string()))?;
    Ok(Json(VapidKeyResponse {
        success: true,
        public_key: key.to_string(),
    }))
}

async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<SubscriptionsResponse>> {
    let subscriptions = state.push.list(&user_id).await?;
    Ok(Json(SubscriptionsResponse {
        success: true,
        subscriptions: subscriptions.into_iter().map(Into::into).collect(),
    }))
}

/// Register or refresh the caller's browser endpoint. Re-registering the
/// same endpoint updates it in place.
async fn create_subscription(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    user_agent: Option<TypedHeader<UserAgent>>,
    Json(req): Json<SubscribeRequest>,
) -> AppResult<Json<SubscribeResponse>> {
    let subscription = state
        .push
        .register(CreatePushSubscription {
            user_id,
            endpoint: req.endpoint,
            p256dh: req.keys.p256dh,
            auth: req.keys.auth,
            user_agent: user_agent.map(|TypedHeader(ua)| ua.as_str().to_string()),
        })
        .await?;

    Ok(Json(SubscribeResponse {
        success: true,
        subscription: subscription.into(),
    }))
}

async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<UnsubscribeRequest>,
) -> AppResult<Json<UnsubscribeResponse>> {
    let removed = state.push.unregister(&user_id, &req.endpoint).await?;
    Ok(Json(UnsubscribeResponse {
        success: true,
        removed,
    }))
}
