use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::routes::auth::AdminUser;
use crate::services::notifiers::DispatchOutcome;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/notifications", post(send_notification))
}

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub user_ids: Vec<String>,
    /// Template key, e.g. `SYSTEM_TEST`.
    pub template: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SendNotificationResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
}

/// Render a template and send it to an explicit list of users.
async fn send_notification(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<SendNotificationRequest>,
) -> AppResult<Json<SendNotificationResponse>> {
    if req.user_ids.is_empty() {
        return Err(AppError::BadRequest("user_ids must not be empty".to_string()));
    }

    tracing::info!(
        admin_id = %admin.id,
        template = %req.template,
        recipients = req.user_ids.len(),
        "Admin notification requested"
    );

    let outcome = state
        .dispatcher
        .send_templated(&req.user_ids, &req.template, &req.data)
        .await?;

    Ok(Json(SendNotificationResponse {
        success: true,
        outcome,
    }))
}
