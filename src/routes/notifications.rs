use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};

use crate::db::models::{Channel, Notification, NotificationType};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::services::notifiers::DispatchOutcome;
use crate::services::store::{ListQuery, UnreadFilter};
use crate::services::templates::{SystemData, TemplateData};
use crate::AppState;

const CONFIRM_MARK_ALL_UNREAD: &str = "mark-all-unread";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/unread-all", post(mark_all_unread))
        .route("/stream", get(stream_changes))
        .route("/test", post(send_test))
        .route("/:id", delete(delete_notification))
        .route("/:id/read", post(mark_read))
        .route("/:id/unread", post(mark_unread))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct NotificationsListResponse {
    pub success: bool,
    pub notifications: Vec<Notification>,
    pub total_count: i64,
    pub page: i64,
    pub limit: i64,
    pub page_count: i64,
}

/// Raw query strings so malformed values become a 400 with our error body.
#[derive(Debug, Deserialize)]
pub struct UnreadCountQuery {
    #[serde(rename = "type")]
    pub notification_type: Option<String>,
    /// Seconds.
    pub max_age: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub success: bool,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub success: bool,
    pub notification: Notification,
}

#[derive(Debug, Serialize)]
pub struct BulkUpdateResponse {
    pub success: bool,
    pub updated: u64,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub confirm: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TestNotificationRequest {
    pub message: Option<String>,
    pub channel: Option<Channel>,
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl UnreadCountQuery {
    fn into_filter(self) -> AppResult<UnreadFilter> {
        let notification_type = match self.notification_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(NotificationType::parse(raw).ok_or_else(|| {
                AppError::BadRequest(format!("Unknown notification type: {}", raw))
            })?),
        };

        let max_age = match self.max_age.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let seconds: i64 = raw.parse().map_err(|_| {
                    AppError::BadRequest(format!("max_age must be a number of seconds, got {}", raw))
                })?;
                if seconds <= 0 {
                    return Err(AppError::BadRequest("max_age must be positive".to_string()));
                }
                Some(chrono::Duration::try_seconds(seconds).ok_or_else(|| {
                    AppError::BadRequest(format!("max_age out of range: {}", seconds))
                })?)
            }
        };

        Ok(UnreadFilter {
            notification_type,
            max_age,
        })
    }
}

/// Load a notification and make sure it belongs to the caller.
async fn owned_notification(state: &AppState, user_id: &str, id: &str) -> AppResult<Notification> {
    let notification = state.store.find(id).await?;
    if notification.user_id != user_id {
        tracing::debug!(notification_id = %id, user_id = %user_id, "Refused access to foreign notification");
        return Err(AppError::Forbidden);
    }
    Ok(notification)
}

// ============================================================================
// Handlers
// ============================================================================

/// Newest first, paginated.
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ListNotificationsQuery>,
) -> AppResult<Json<NotificationsListResponse>> {
    let page = state
        .store
        .list(
            &user_id,
            ListQuery {
                page: query.page,
                limit: query.limit,
                unread_only: query.unread_only,
            },
        )
        .await?;

    Ok(Json(NotificationsListResponse {
        success: true,
        notifications: page.items,
        total_count: page.total_count,
        page: page.page,
        limit: page.limit,
        page_count: page.page_count,
    }))
}

async fn unread_count(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<UnreadCountQuery>,
) -> AppResult<Json<UnreadCountResponse>> {
    let filter = query.into_filter()?;
    let count = state.store.unread_count(&user_id, filter).await?;
    Ok(Json(UnreadCountResponse {
        success: true,
        count,
    }))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<NotificationResponse>> {
    owned_notification(&state, &user_id, &id).await?;
    let notification = state.store.mark_read(&id).await?;
    Ok(Json(NotificationResponse {
        success: true,
        notification,
    }))
}

async fn mark_unread(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<NotificationResponse>> {
    owned_notification(&state, &user_id, &id).await?;
    let notification = state.store.mark_unread(&id).await?;
    Ok(Json(NotificationResponse {
        success: true,
        notification,
    }))
}

async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<BulkUpdateResponse>> {
    let updated = state.store.mark_all_read(&user_id).await?;
    Ok(Json(BulkUpdateResponse {
        success: true,
        updated,
    }))
}

/// Bulk un-read needs `{"confirm": "mark-all-unread"}` in the body.
async fn mark_all_unread(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    body: Bytes,
) -> AppResult<Json<BulkUpdateResponse>> {
    let request: ConfirmRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid payload: {}", e)))?;
    if request.confirm.as_deref() != Some(CONFIRM_MARK_ALL_UNREAD) {
        return Err(AppError::BadRequest(format!(
            "Marking everything unread requires confirm = \"{}\"",
            CONFIRM_MARK_ALL_UNREAD
        )));
    }

    let updated = state.store.mark_all_unread(&user_id).await?;
    Ok(Json(BulkUpdateResponse {
        success: true,
        updated,
    }))
}

async fn delete_notification(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<SuccessResponse>> {
    owned_notification(&state, &user_id, &id).await?;
    state.store.delete(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Server-sent events of the caller's inbox changes.
async fn stream_changes(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!(user_id = %user_id, "Opening notification stream");
    let changes = state.store.feed().subscribe(&user_id);

    let events = stream::unfold(changes, |mut changes| async move {
        let change = changes.next().await?;
        let event = Event::default()
            .event(change.kind.as_str())
            .json_data(&change)
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to encode change event: {}", e);
                Event::default().event("RESYNC").data("{}")
            });
        Some((Ok(event), changes))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Send the caller a test notification, in-app unless `channel` says PUSH.
async fn send_test(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    body: Bytes,
) -> AppResult<Json<DispatchResponse>> {
    let request: TestNotificationRequest = if body.is_empty() {
        TestNotificationRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid payload: {}", e)))?
    };

    let data = match request.message.filter(|m| !m.trim().is_empty()) {
        Some(message) => SystemData { message },
        None => SystemData::default(),
    };
    let outcome = state
        .dispatcher
        .deliver(
            request.channel.unwrap_or(Channel::InApp),
            &user_id,
            TemplateData::SystemTest(data),
        )
        .await?;

    Ok(Json(DispatchResponse {
        success: true,
        outcome,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::db::models::NotificationType;
    use crate::test_support::{body_json, new_notification, test_app, test_state, token_for};

    fn get(uri: &str, user: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("authorization", format!("Bearer {}", token_for(user)))
            .body(Body::empty())
            .unwrap()
    }

    fn post(uri: &str, user: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("authorization", format!("Bearer {}", token_for(user)))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn requests_without_token_are_unauthorized() {
        let state = test_state().await;
        let res = test_app(state)
            .oneshot(Request::builder().uri("/api/notifications").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn list_returns_callers_rows_newest_first() {
        let state = test_state().await;
        for i in 0..3 {
            let mut n = new_notification("u1", NotificationType::System);
            n.title = format!("n{}", i);
            state.store.create(n).await.unwrap();
        }
        state
            .store
            .create(new_notification("u2", NotificationType::System))
            .await
            .unwrap();

        let res = test_app(state)
            .oneshot(get("/api/notifications?limit=2", "u1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["total_count"], 3);
        assert_eq!(body["page_count"], 2);
        assert_eq!(body["notifications"][0]["title"], "n2");
        assert_eq!(body["notifications"][1]["title"], "n1");
    }

    #[tokio::test]
    async fn huge_page_number_is_a_bad_request() {
        let state = test_state().await;
        let res = test_app(state)
            .oneshot(get("/api/notifications?page=9223372036854775807", "u1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unread_count_rejects_malformed_filters() {
        let state = test_state().await;
        let app = test_app(state);

        let res = app
            .clone()
            .oneshot(get("/api/notifications/unread-count?type=NOT_A_TYPE", "u1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app
            .clone()
            .oneshot(get("/api/notifications/unread-count?max_age=soon", "u1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        for huge in ["9223372036854775807", "9000000000000000"] {
            let res = app
                .clone()
                .oneshot(get(
                    &format!("/api/notifications/unread-count?max_age={}", huge),
                    "u1",
                ))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        }

        let res = app
            .oneshot(get("/api/notifications/unread-count?type=system&max_age=3600", "u1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["count"], 0);
    }

    #[tokio::test]
    async fn read_of_foreign_or_missing_row_is_refused() {
        let state = test_state().await;
        let created = state
            .store
            .create(new_notification("owner", NotificationType::System))
            .await
            .unwrap();
        let id = match created {
            crate::services::store::CreateOutcome::Created(n) => n.id,
            crate::services::store::CreateOutcome::Skipped => unreachable!(),
        };
        let app = test_app(state);

        let res = app
            .clone()
            .oneshot(post(&format!("/api/notifications/{}/read", id), "intruder", ""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = app
            .clone()
            .oneshot(post("/api/notifications/missing/read", "owner", ""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = app
            .oneshot(post(&format!("/api/notifications/{}/read", id), "owner", ""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["notification"]["is_read"], true);
    }

    #[tokio::test]
    async fn unread_all_requires_confirmation() {
        let state = test_state().await;
        let app = test_app(state);

        let res = app
            .clone()
            .oneshot(post("/api/notifications/unread-all", "u1", "{}"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app
            .oneshot(post(
                "/api/notifications/unread-all",
                "u1",
                r#"{"confirm":"mark-all-unread"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_endpoint_creates_a_system_notification() {
        let state = test_state().await;
        let app = test_app(state.clone());

        let res = app
            .oneshot(post("/api/notifications/test", "u1", r#"{"message":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["outcome"], "delivered");

        let page = state.store.list("u1", Default::default()).await.unwrap();
        assert_eq!(page.items[0].message, "ping");
    }

    #[tokio::test]
    async fn test_endpoint_rejects_email() {
        let state = test_state().await;
        let res = test_app(state)
            .oneshot(post("/api/notifications/test", "u1", r#"{"channel":"EMAIL"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
