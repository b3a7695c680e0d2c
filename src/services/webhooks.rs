use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tokio::task::JoinHandle;

use crate::error::{AppError, AppResult};
use crate::services::notifiers::Dispatcher;

type HmacSha256 = Hmac<Sha256>;

pub const MESSAGE_ID_HEADER: &str = "x-marketplace-message-id";
pub const MESSAGE_TIMESTAMP_HEADER: &str = "x-marketplace-message-timestamp";
pub const MESSAGE_SIGNATURE_HEADER: &str = "x-marketplace-signature";

/// Lifecycle events emitted by the marketplace after its own transaction
/// commits. The body is `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum DomainEvent {
    #[serde(rename = "order.placed")]
    OrderPlaced { order_id: String },
    #[serde(rename = "order.status_changed")]
    OrderStatusChanged { order_id: String, status: String },
    #[serde(rename = "order.cancelled")]
    OrderCancelled {
        order_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(rename = "order.agent_assigned")]
    AgentAssigned { order_id: String },
    #[serde(rename = "payment.succeeded")]
    PaymentSucceeded { order_id: String },
    #[serde(rename = "payment.failed")]
    PaymentFailed {
        order_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(rename = "payout.requested")]
    PayoutRequested { payout_id: String },
    #[serde(rename = "payout.processed")]
    PayoutProcessed { payout_id: String },
    #[serde(rename = "payout.failed")]
    PayoutFailed {
        payout_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(rename = "refund.requested")]
    RefundRequested { return_id: String },
    #[serde(rename = "refund.approved")]
    RefundApproved { return_id: String },
    #[serde(rename = "refund.rejected")]
    RefundRejected {
        return_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(rename = "refund.processed")]
    RefundProcessed { return_id: String },
    #[serde(rename = "product.submitted")]
    ProductSubmitted { product_id: String },
    #[serde(rename = "product.approved")]
    ProductApproved { product_id: String },
    #[serde(rename = "product.rejected")]
    ProductRejected {
        product_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(rename = "product.stock_changed")]
    StockChanged { product_id: String },
    #[serde(rename = "vendor.registered")]
    VendorRegistered { vendor_id: String },
    #[serde(rename = "coupon.usage_threshold")]
    CouponUsageThreshold { coupon_id: String },
    #[serde(rename = "coupon.expiring")]
    CouponExpiring { coupon_id: String },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::OrderPlaced { .. } => "order.placed",
            DomainEvent::OrderStatusChanged { .. } => "order.status_changed",
            DomainEvent::OrderCancelled { .. } => "order.cancelled",
            DomainEvent::AgentAssigned { .. } => "order.agent_assigned",
            DomainEvent::PaymentSucceeded { .. } => "payment.succeeded",
            DomainEvent::PaymentFailed { .. } => "payment.failed",
            DomainEvent::PayoutRequested { .. } => "payout.requested",
            DomainEvent::PayoutProcessed { .. } => "payout.processed",
            DomainEvent::PayoutFailed { .. } => "payout.failed",
            DomainEvent::RefundRequested { .. } => "refund.requested",
            DomainEvent::RefundApproved { .. } => "refund.approved",
            DomainEvent::RefundRejected { .. } => "refund.rejected",
            DomainEvent::RefundProcessed { .. } => "refund.processed",
            DomainEvent::ProductSubmitted { .. } => "product.submitted",
            DomainEvent::ProductApproved { .. } => "product.approved",
            DomainEvent::ProductRejected { .. } => "product.rejected",
            DomainEvent::StockChanged { .. } => "product.stock_changed",
            DomainEvent::VendorRegistered { .. } => "vendor.registered",
            DomainEvent::CouponUsageThreshold { .. } => "coupon.usage_threshold",
            DomainEvent::CouponExpiring { .. } => "coupon.expiring",
        }
    }
}

pub struct WebhookService;

impl WebhookService {
    /// Extract message id, timestamp and signature headers.
    pub fn extract_headers(headers: &HeaderMap) -> AppResult<(String, String, String)> {
        let message_id = Self::get_header(headers, MESSAGE_ID_HEADER)?;
        let timestamp = Self::get_header(headers, MESSAGE_TIMESTAMP_HEADER)?;
        let signature = Self::get_header(headers, MESSAGE_SIGNATURE_HEADER)?;
        Ok((message_id, timestamp, signature))
    }

    fn get_header(headers: &HeaderMap, name: &str) -> AppResult<String> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::BadRequest(format!("Missing header: {}", name)))
    }

    /// `sha256=<hex>` of HMAC-SHA256 over message id, timestamp and body.
    pub fn sign(secret: &str, message_id: &str, timestamp: &str, body: &[u8]) -> AppResult<String> {
        let mac = Self::mac(secret, message_id, timestamp, body)?;
        Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }

    fn mac(secret: &str, message_id: &str, timestamp: &str, body: &[u8]) -> AppResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Failed to create HMAC")))?;
        mac.update(message_id.as_bytes());
        mac.update(timestamp.as_bytes());
        mac.update(body);
        Ok(mac)
    }

    /// Verify the signature, then reject timestamps outside the skew window.
    pub fn verify_signature(
        secret: &str,
        max_skew_seconds: i64,
        message_id: &str,
        timestamp: &str,
        body: &[u8],
        signature: &str,
    ) -> AppResult<()> {
        if secret.is_empty() {
            return Err(AppError::ServiceUnavailable(
                "Webhook signing secret is not configured".to_string(),
            ));
        }

        let expected_sig = match signature.strip_prefix("sha256=") {
            Some(hex_sig) => hex::decode(hex_sig)
                .map_err(|_| AppError::BadRequest("Invalid signature format".to_string()))?,
            None => return Err(AppError::BadRequest("Invalid signature format".to_string())),
        };

        Self::mac(secret, message_id, timestamp, body)?
            .verify_slice(&expected_sig)
            .map_err(|_| AppError::Unauthorized)?;

        let msg_time = chrono::DateTime::parse_from_rfc3339(timestamp)
            .map_err(|_| AppError::BadRequest("Invalid timestamp".to_string()))?;
        let diff = Utc::now().signed_duration_since(msg_time);
        if diff.num_seconds().abs() > max_skew_seconds {
            return Err(AppError::BadRequest("Message too old".to_string()));
        }

        Ok(())
    }

    /// Fan an event out to its notifiers, each on its own task.
    pub fn dispatch(dispatcher: &Dispatcher, event: DomainEvent) -> Vec<JoinHandle<()>> {
        tracing::info!(event = event.name(), "Dispatching domain event");

        match event {
            DomainEvent::OrderPlaced { order_id } => {
                let vendors = order_id.clone();
                let admins = order_id.clone();
                vec![
                    dispatcher.dispatch_detached("order_confirmation", move |d| async move {
                        d.send_order_confirmation(&order_id).await
                    }),
                    dispatcher.dispatch_detached("new_order_vendors", move |d| async move {
                        d.send_new_order_to_vendors(&vendors).await
                    }),
                    dispatcher.dispatch_detached("high_value_order", move |d| async move {
                        d.send_high_value_order_alert(&admins).await
                    }),
                ]
            }
            DomainEvent::OrderStatusChanged { order_id, status } => {
                let agent_order = order_id.clone();
                let agent_status = status.clone();
                vec![
                    dispatcher.dispatch_detached("order_status_change", move |d| async move {
                        d.send_order_status_change(&order_id, &status).await
                    }),
                    dispatcher.dispatch_detached("agent_order_update", move |d| async move {
                        d.send_agent_order_update(&agent_order, &agent_status).await
                    }),
                ]
            }
            DomainEvent::OrderCancelled { order_id, reason } => {
                vec![dispatcher.dispatch_detached("order_cancelled", move |d| async move {
                    d.send_order_cancelled(&order_id, reason.as_deref()).await
                })]
            }
            DomainEvent::AgentAssigned { order_id } => {
                vec![dispatcher.dispatch_detached("agent_order_assigned", move |d| async move {
                    d.send_agent_order_assigned(&order_id).await
                })]
            }
            DomainEvent::PaymentSucceeded { order_id } => {
                vec![dispatcher.dispatch_detached("payment_success", move |d| async move {
                    d.send_payment_success(&order_id).await
                })]
            }
            DomainEvent::PaymentFailed { order_id, reason } => {
                vec![dispatcher.dispatch_detached("payment_failed", move |d| async move {
                    d.send_payment_failed(&order_id, reason.as_deref()).await
                })]
            }
            DomainEvent::PayoutRequested { payout_id } => {
                let admins = payout_id.clone();
                vec![
                    dispatcher.dispatch_detached("payout_requested", move |d| async move {
                        d.send_payout_requested(&payout_id).await
                    }),
                    dispatcher.dispatch_detached("admin_payout_request", move |d| async move {
                        d.send_payout_request_to_admins(&admins).await
                    }),
                ]
            }
            DomainEvent::PayoutProcessed { payout_id } => {
                vec![dispatcher.dispatch_detached("payout_processed", move |d| async move {
                    d.send_payout_processed(&payout_id).await
                })]
            }
            DomainEvent::PayoutFailed { payout_id, reason } => {
                vec![dispatcher.dispatch_detached("payout_failed", move |d| async move {
                    d.send_payout_failed(&payout_id, reason.as_deref()).await
                })]
            }
            DomainEvent::RefundRequested { return_id } => {
                let admins = return_id.clone();
                vec![
                    dispatcher.dispatch_detached("refund_requested", move |d| async move {
                        d.send_refund_requested(&return_id).await
                    }),
                    dispatcher.dispatch_detached("admin_refund_request", move |d| async move {
                        d.send_refund_request_to_admins(&admins).await
                    }),
                ]
            }
            DomainEvent::RefundApproved { return_id } => {
                vec![dispatcher.dispatch_detached("refund_approved", move |d| async move {
                    d.send_refund_approved(&return_id).await
                })]
            }
            DomainEvent::RefundRejected { return_id, reason } => {
                vec![dispatcher.dispatch_detached("refund_rejected", move |d| async move {
                    d.send_refund_rejected(&return_id, reason.as_deref()).await
                })]
            }
            DomainEvent::RefundProcessed { return_id } => {
                vec![dispatcher.dispatch_detached("refund_processed", move |d| async move {
                    d.send_refund_processed(&return_id).await
                })]
            }
            DomainEvent::ProductSubmitted { product_id } => {
                vec![dispatcher.dispatch_detached("product_pending_review", move |d| async move {
                    d.send_product_pending_review(&product_id).await
                })]
            }
            DomainEvent::ProductApproved { product_id } => {
                vec![dispatcher.dispatch_detached("product_approved", move |d| async move {
                    d.send_product_approved(&product_id).await
                })]
            }
            DomainEvent::ProductRejected { product_id, reason } => {
                vec![dispatcher.dispatch_detached("product_rejected", move |d| async move {
                    d.send_product_rejected(&product_id, reason.as_deref()).await
                })]
            }
            DomainEvent::StockChanged { product_id } => {
                vec![dispatcher.dispatch_detached("product_stock", move |d| async move {
                    d.check_product_stock(&product_id).await
                })]
            }
            DomainEvent::VendorRegistered { vendor_id } => {
                vec![dispatcher.dispatch_detached("new_vendor", move |d| async move {
                    d.send_new_vendor_alert(&vendor_id).await
                })]
            }
            DomainEvent::CouponUsageThreshold { coupon_id } => {
                vec![dispatcher.dispatch_detached("coupon_usage", move |d| async move {
                    d.send_coupon_usage_alert(&coupon_id).await
                })]
            }
            DomainEvent::CouponExpiring { coupon_id } => {
                vec![dispatcher.dispatch_detached("coupon_expiring", move |d| async move {
                    d.send_coupon_expiring(&coupon_id).await
                })]
            }
        }
    }
}
