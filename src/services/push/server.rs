use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use sqlx::SqlitePool;
use url::Url;

use super::gateway::{DeliveryOutcome, PushGateway, VapidKeys, WebPushGateway};
use super::presentation::PushPayload;
use crate::config::PushConfig;
use crate::db::models::{CreatePushSubscription, PushSubscription};
use crate::db::PushSubscriptionRepository;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PushSendReport {
    pub success: bool,
    pub sent: usize,
    pub failed: usize,
    pub deactivated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushSendReport {
    fn finish(mut self) -> Self {
        self.success = self.sent > 0 || self.failed == 0;
        self
    }
}

/// Server side of browser push: subscription bookkeeping and fan-out to every
/// active endpoint of a user.
#[derive(Clone)]
pub struct PushService {
    pool: SqlitePool,
    gateway: Option<Arc<dyn PushGateway>>,
    public_key: Option<String>,
    concurrency: usize,
}

impl PushService {
    pub fn new(
        pool: SqlitePool,
        gateway: Option<Arc<dyn PushGateway>>,
        public_key: Option<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            pool,
            gateway,
            public_key,
            concurrency: concurrency.max(1),
        }
    }

    pub fn from_config(pool: SqlitePool, config: &PushConfig) -> AppResult<Self> {
        let Some(keys) = VapidKeys::from_config(config)? else {
            tracing::info!("VAPID keys not configured, browser push disabled");
            return Ok(Self::new(pool, None, None, config.concurrency));
        };

        let public_key = keys.public_key().to_string();
        let gateway = WebPushGateway::new(keys, config.ttl_seconds)?;
        Ok(Self::new(
            pool,
            Some(Arc::new(gateway)),
            Some(public_key),
            config.concurrency,
        ))
    }

    pub fn is_enabled(&self) -> bool {
        self.gateway.is_some()
    }

    pub fn vapid_public_key(&self) -> Option<&str> {
        self.public_key.as_deref()
    }

    /// Idempotent per `(user_id, endpoint)`.
    pub async fn register(&self, new: CreatePushSubscription) -> AppResult<PushSubscription> {
        let endpoint = Url::parse(&new.endpoint)
            .map_err(|e| AppError::Validation(format!("Invalid push endpoint: {}", e)))?;
        if !matches!(endpoint.scheme(), "https" | "http") {
            return Err(AppError::Validation(
                "Push endpoint must be an http(s) URL".to_string(),
            ));
        }
        if new.p256dh.trim().is_empty() || new.auth.trim().is_empty() {
            return Err(AppError::Validation(
                "Subscription keys p256dh and auth are required".to_string(),
            ));
        }

        let subscription = PushSubscriptionRepository::upsert(&self.pool, &new).await?;
        tracing::info!(
            user_id = %subscription.user_id,
            subscription_id = %subscription.id,
            "Registered push subscription"
        );
        Ok(subscription)
    }

    pub async fn list(&self, user_id: &str) -> AppResult<Vec<PushSubscription>> {
        PushSubscriptionRepository::list_for_user(&self.pool, user_id).await
    }

    pub async fn unregister(&self, user_id: &str, endpoint: &str) -> AppResult<bool> {
        PushSubscriptionRepository::delete_by_endpoint(&self.pool, user_id, endpoint).await
    }

    /// Deliver to every active endpoint. One endpoint failing never stops the
    /// others.
    pub async fn send(&self, user_id: &str, payload: &PushPayload) -> PushSendReport {
        let report = PushSendReport::default();

        let Some(gateway) = self.gateway.clone() else {
            return PushSendReport {
                error: Some("Push delivery is not configured".to_string()),
                ..report
            }
            .finish();
        };

        let subscriptions =
            match PushSubscriptionRepository::list_active_for_user(&self.pool, user_id).await {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, "Failed to load push subscriptions: {:?}", e);
                    return PushSendReport {
                        success: false,
                        error: Some(e.to_string()),
                        ..report
                    };
                }
            };

        if subscriptions.is_empty() {
            return report.finish();
        }

        let outcomes: Vec<(PushSubscription, DeliveryOutcome)> = stream::iter(subscriptions)
            .map(|sub| {
                let gateway = gateway.clone();
                async move {
                    let outcome = gateway.deliver(&sub, payload).await;
                    (sub, outcome)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = report;
        for (sub, outcome) in outcomes {
            match outcome {
                DeliveryOutcome::Delivered => {
                    report.sent += 1;
                    if let Err(e) =
                        PushSubscriptionRepository::touch_last_used(&self.pool, &sub.id).await
                    {
                        tracing::warn!(subscription_id = %sub.id, "Failed to touch subscription: {:?}", e);
                    }
                }
                DeliveryOutcome::Gone(reason) => {
                    report.failed += 1;
                    match PushSubscriptionRepository::deactivate(&self.pool, &sub.id).await {
                        Ok(()) => {
                            report.deactivated += 1;
                            tracing::info!(
                                subscription_id = %sub.id,
                                reason = %reason,
                                "Deactivated stale push subscription"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(subscription_id = %sub.id, "Failed to deactivate subscription: {:?}", e);
                        }
                    }
                }
                DeliveryOutcome::Transient(reason) => {
                    report.failed += 1;
                    tracing::warn!(
                        subscription_id = %sub.id,
                        endpoint = %sub.endpoint,
                        "Push delivery failed: {}",
                        reason
                    );
                    report.error = Some(reason);
                }
            }
        }

        tracing::debug!(
            user_id = %user_id,
            sent = report.sent,
            failed = report.failed,
            deactivated = report.deactivated,
            "Push fan-out finished"
        );
        report.finish()
    }
}
