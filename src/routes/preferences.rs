use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::models::{Channel, NotificationPreference, NotificationType, UpdatePreference};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::services::preferences::PreferenceGate;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_preferences).put(update_preferences))
        .route("/reset", post(reset_preferences))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// One cell of the type x channel matrix, stored or defaulted.
#[derive(Debug, Serialize)]
pub struct PreferenceEntry {
    pub notification_type: NotificationType,
    pub channel: Channel,
    pub enabled: bool,
    /// False when no row exists and the default applies.
    pub stored: bool,
}

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    pub success: bool,
    pub preferences: Vec<PreferenceEntry>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePreferencesRequest {
    pub preferences: Vec<UpdatePreference>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub success: bool,
    pub removed: u64,
}

/// Expand stored rows into the full matrix of deliverable channels.
fn preference_matrix(stored: &[NotificationPreference]) -> Vec<PreferenceEntry> {
    let mut entries = Vec::new();
    for notification_type in NotificationType::ALL {
        for channel in Channel::ALL.into_iter().filter(|c| c.is_deliverable()) {
            let row = stored
                .iter()
                .find(|p| p.notification_type == notification_type && p.channel == channel);
            entries.push(PreferenceEntry {
                notification_type,
                channel,
                enabled: row.map(|p| p.enabled).unwrap_or(true),
                stored: row.is_some(),
            });
        }
    }
    entries
}

// ============================================================================
// Handlers
// ============================================================================

async fn get_preferences(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<PreferencesResponse>> {
    let stored = PreferenceGate::list(&state.db, &user_id).await?;
    Ok(Json(PreferencesResponse {
        success: true,
        preferences: preference_matrix(&stored),
    }))
}

async fn update_preferences(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<UpdatePreferencesRequest>,
) -> AppResult<Json<PreferencesResponse>> {
    if req.preferences.is_empty() {
        return Err(AppError::BadRequest("No preferences supplied".to_string()));
    }

    PreferenceGate::update(&state.db, &user_id, &req.preferences).await?;
    tracing::info!(user_id = %user_id, count = req.preferences.len(), "Updated notification preferences");

    let stored = PreferenceGate::list(&state.db, &user_id).await?;
    Ok(Json(PreferencesResponse {
        success: true,
        preferences: preference_matrix(&stored),
    }))
}

async fn reset_preferences(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<ResetResponse>> {
    let removed = PreferenceGate::reset(&state.db, &user_id).await?;
    Ok(Json(ResetResponse {
        success: true,
        removed,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::test_support::{body_json, test_app, test_state, token_for};

    #[tokio::test]
    async fn matrix_defaults_to_enabled_and_reflects_updates() {
        let state = test_state().await;
        let app = test_app(state);
        let token = token_for("u1");

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/preferences")
                    .header("authorization", format!("Bearer {}", token))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"preferences":[{"notification_type":"LOW_STOCK_ALERT","channel":"PUSH","enabled":false}]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body = body_json(res).await;
        let prefs = body["preferences"].as_array().unwrap();
        assert_eq!(prefs.len(), NotificationType::ALL.len() * 2);
        let cell = prefs
            .iter()
            .find(|p| p["notification_type"] == "LOW_STOCK_ALERT" && p["channel"] == "PUSH")
            .unwrap();
        assert_eq!(cell["enabled"], false);
        assert_eq!(cell["stored"], true);
        assert!(prefs
            .iter()
            .filter(|p| p["stored"] == false)
            .all(|p| p["enabled"] == true));

        let res = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/preferences/reset")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(res).await["removed"], 1);
    }
}
