use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::services::notifiers::SweepReport;
use crate::services::webhooks::{DomainEvent, WebhookService};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", post(handle_event))
        .route("/sweeps/inventory", post(run_inventory_sweep))
        .route("/sweeps/coupons", post(run_coupon_sweep))
}

#[derive(Debug, Serialize)]
pub struct EventAccepted {
    pub success: bool,
    pub event: &'static str,
    pub dispatched: usize,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub success: bool,
    pub report: SweepReport,
}

fn verify(state: &AppState, headers: &HeaderMap, body: &[u8]) -> AppResult<String> {
    let (message_id, timestamp, signature) = WebhookService::extract_headers(headers)?;
    WebhookService::verify_signature(
        &state.config.webhook.signing_secret,
        state.config.webhook.max_skew_seconds,
        &message_id,
        &timestamp,
        body,
        &signature,
    )?;
    Ok(message_id)
}

/// Accept a signed domain event and notify in the background. Responds 202
/// before any notification is written.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<EventAccepted>)> {
    let message_id = verify(&state, &headers, &body)?;

    let event: DomainEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid payload: {}", e)))?;

    tracing::info!(message_id = %message_id, event = event.name(), "Received domain event");

    let name = event.name();
    let handles = WebhookService::dispatch(&state.dispatcher, event);

    Ok((
        StatusCode::ACCEPTED,
        Json(EventAccepted {
            success: true,
            event: name,
            dispatched: handles.len(),
        }),
    ))
}

async fn run_inventory_sweep(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<SweepResponse>> {
    verify(&state, &headers, &body)?;
    let report = state.dispatcher.sweep_inventory().await?;
    Ok(Json(SweepResponse {
        success: true,
        report,
    }))
}

async fn run_coupon_sweep(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<SweepResponse>> {
    verify(&state, &headers, &body)?;
    let report = state.dispatcher.sweep_coupons().await?;
    Ok(Json(SweepResponse {
        success: true,
        report,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use tower::ServiceExt;

    use super::*;
    use crate::services::webhooks::{
        MESSAGE_ID_HEADER, MESSAGE_SIGNATURE_HEADER, MESSAGE_TIMESTAMP_HEADER,
    };
    use crate::test_support::{
        body_json, insert_product, insert_vendor, test_app, test_state, WEBHOOK_SECRET,
    };

    fn signed(uri: &str, body: &str) -> Request<Body> {
        let ts = Utc::now().to_rfc3339();
        let sig = WebhookService::sign(WEBHOOK_SECRET, "msg-1", &ts, body.as_bytes()).unwrap();
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(MESSAGE_ID_HEADER, "msg-1")
            .header(MESSAGE_TIMESTAMP_HEADER, ts)
            .header(MESSAGE_SIGNATURE_HEADER, sig)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn signed_event_is_accepted() {
        let state = test_state().await;
        let res = test_app(state)
            .oneshot(signed(
                "/webhooks/events",
                r#"{"event":"order.placed","data":{"order_id":"o1"}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let body = body_json(res).await;
        assert_eq!(body["event"], "order.placed");
        assert_eq!(body["dispatched"], 3);
    }

    #[tokio::test]
    async fn unsigned_or_unknown_events_are_rejected() {
        let state = test_state().await;
        let app = test_app(state);

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/events")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let mut req = signed("/webhooks/events", r#"{"event":"order.placed","data":{"order_id":"o1"}}"#);
        req.headers_mut()
            .insert(MESSAGE_ID_HEADER, "msg-2".parse().unwrap());
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .oneshot(signed("/webhooks/events", r#"{"event":"nope","data":{}}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn inventory_sweep_returns_report() {
        let state = test_state().await;
        insert_vendor(&state.db, "v1", "vendor-user", "Acme Goods").await;
        insert_product(&state.db, "p1", "v1", "Red Kettle", 2).await;

        let res = test_app(state)
            .oneshot(signed("/webhooks/sweeps/inventory", ""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["report"]["scanned"], 1);
        assert_eq!(body["report"]["notified"], 1);
    }
}
