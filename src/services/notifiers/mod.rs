//! Domain notifiers.
//!
//! Every lifecycle event maps to one `Dispatcher` method that loads the
//! context rows it needs, resolves recipients, renders a template, stores the
//! result and optionally pushes it to the recipient's browsers. Methods return
//! [`DispatchResult`]; callers on a business path either await and
//! [`Dispatcher::report`] it, or hand it to [`Dispatcher::dispatch_detached`].

mod admin;
mod agents;
mod coupons;
mod inventory;
mod orders;
mod payments;
mod payouts;
mod products;
mod refunds;

use std::future::Future;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;

use crate::config::{DispatchConfig, SweepConfig};
use crate::db::models::{Channel, CreateNotification, Notification};
use crate::error::NotificationError;
use crate::services::preferences::PreferenceGate;
use crate::services::push::{PushPayload, PushService};
use crate::services::store::{CreateOutcome, NotificationStore};
use crate::services::templates::{render, TemplateData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    PreferenceDisabled,
    RecipientUnresolved,
    /// The event did not cross the configured alert threshold.
    BelowThreshold,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Delivered { notification_ids: Vec<String> },
    Skipped { reason: SkipReason },
}

impl DispatchOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        DispatchOutcome::Skipped { reason }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }

    pub fn delivered_count(&self) -> usize {
        match self {
            DispatchOutcome::Delivered { notification_ids } => notification_ids.len(),
            DispatchOutcome::Skipped { .. } => 0,
        }
    }
}

pub type DispatchResult = Result<DispatchOutcome, NotificationError>;

/// Tally of one threshold sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub notified: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, result: &DispatchResult) {
        match result {
            Ok(DispatchOutcome::Delivered { notification_ids }) => {
                self.notified += notification_ids.len()
            }
            Ok(DispatchOutcome::Skipped { .. }) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Row links stored alongside a notification.
#[derive(Debug, Clone, Default)]
pub(crate) struct Refs {
    order_id: Option<String>,
    return_id: Option<String>,
}

impl Refs {
    pub(crate) fn order(order_id: &str) -> Self {
        Self {
            order_id: Some(order_id.to_string()),
            return_id: None,
        }
    }

    pub(crate) fn refund(return_id: &str, order_id: Option<&str>) -> Self {
        Self {
            order_id: order_id.map(str::to_string),
            return_id: Some(return_id.to_string()),
        }
    }
}

pub(crate) struct Recipient {
    user_id: String,
    data: TemplateData,
    refs: Refs,
}

impl Recipient {
    pub(crate) fn new(user_id: impl Into<String>, data: TemplateData, refs: Refs) -> Self {
        Self {
            user_id: user_id.into(),
            data,
            refs,
        }
    }
}

fn context<T>(row: Option<T>, what: &str, id: &str) -> Result<T, NotificationError> {
    row.ok_or_else(|| NotificationError::ContextNotFound(format!("{} {}", what, id)))
}

fn build_notification(user_id: &str, data: &TemplateData, refs: Refs) -> CreateNotification {
    let rendered = render(data);
    CreateNotification {
        user_id: user_id.to_string(),
        title: rendered.title,
        message: rendered.message,
        notification_type: rendered.notification_type,
        order_id: refs.order_id,
        return_id: refs.return_id,
        reference_url: rendered.reference_url,
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

#[derive(Clone)]
pub struct Dispatcher {
    pool: SqlitePool,
    store: NotificationStore,
    push: PushService,
    config: DispatchConfig,
    sweeps: SweepConfig,
}

impl Dispatcher {
    pub fn new(
        store: NotificationStore,
        push: PushService,
        config: DispatchConfig,
        sweeps: SweepConfig,
    ) -> Self {
        Self {
            pool: store.pool().clone(),
            store,
            push,
            config,
            sweeps,
        }
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    pub fn push(&self) -> &PushService {
        &self.push
    }

    /// Log the result of a notifier call. Failures stop here.
    pub fn report(label: &str, result: &DispatchResult) {
        match result {
            Ok(DispatchOutcome::Delivered { notification_ids }) => {
                tracing::debug!(event = label, count = notification_ids.len(), "Notification delivered");
            }
            Ok(DispatchOutcome::Skipped { reason }) => {
                tracing::debug!(event = label, reason = ?reason, "Notification skipped");
            }
            Err(e) => {
                tracing::warn!(event = label, "Notification failed: {}", e);
            }
        }
    }

    /// Run a notifier on its own task so the calling transaction never waits
    /// on it. The outcome is logged; there is no ordering guarantee relative
    /// to the caller.
    pub fn dispatch_detached<F, Fut>(&self, label: &'static str, f: F) -> JoinHandle<()>
    where
        F: FnOnce(Dispatcher) -> Fut + Send + 'static,
        Fut: Future<Output = DispatchResult> + Send + 'static,
    {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let result = f(dispatcher).await;
            Dispatcher::report(label, &result);
        })
    }

    /// Route an already-built template to one user over `channel`.
    pub async fn deliver(
        &self,
        channel: Channel,
        user_id: &str,
        data: TemplateData,
    ) -> DispatchResult {
        match channel {
            Channel::InApp => self.notify_user(Some(user_id), data, Refs::default()).await,
            Channel::Push => self.push_only(user_id, &data).await,
            Channel::Email | Channel::Sms => Err(NotificationError::UnsupportedChannel(channel)),
        }
    }

    pub(crate) async fn notify_user(
        &self,
        user_id: Option<&str>,
        data: TemplateData,
        refs: Refs,
    ) -> DispatchResult {
        let Some(user_id) = user_id.filter(|u| !u.trim().is_empty()) else {
            tracing::debug!(template = data.key().as_str(), "No recipient for notification");
            return Ok(DispatchOutcome::skipped(SkipReason::RecipientUnresolved));
        };

        let new = build_notification(user_id, &data, refs);
        match self.store.create(new).await? {
            CreateOutcome::Created(notification) => {
                self.push_copy(&notification).await;
                Ok(DispatchOutcome::Delivered {
                    notification_ids: vec![notification.id],
                })
            }
            CreateOutcome::Skipped => Ok(DispatchOutcome::skipped(SkipReason::PreferenceDisabled)),
        }
    }

    /// Fan-out: one stored row per recipient, written as a single batch.
    pub(crate) async fn notify_many(&self, recipients: Vec<Recipient>) -> DispatchResult {
        if recipients.is_empty() {
            return Ok(DispatchOutcome::skipped(SkipReason::RecipientUnresolved));
        }

        let batch = recipients
            .into_iter()
            .map(|r| build_notification(&r.user_id, &r.data, r.refs))
            .collect();
        let report = self.store.create_batch(batch).await?;

        for error in &report.errors {
            tracing::warn!(index = error.index, "Dropped invalid notification: {}", error.message);
        }
        if report.created.is_empty() {
            return Ok(DispatchOutcome::skipped(SkipReason::PreferenceDisabled));
        }

        futures::future::join_all(report.created.iter().map(|n| self.push_copy(n))).await;

        Ok(DispatchOutcome::Delivered {
            notification_ids: report.created.into_iter().map(|n| n.id).collect(),
        })
    }

    async fn push_copy(&self, notification: &Notification) {
        if !self.config.push_enabled || !self.push.is_enabled() {
            return;
        }
        if !PreferenceGate::is_enabled(
            &self.pool,
            &notification.user_id,
            notification.notification_type,
            Channel::Push,
        )
        .await
        {
            return;
        }

        let report = self
            .push
            .send(&notification.user_id, &PushPayload::from_notification(notification))
            .await;
        if !report.success {
            tracing::warn!(
                notification_id = %notification.id,
                failed = report.failed,
                "Push copy not delivered: {}",
                report.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    async fn push_only(&self, user_id: &str, data: &TemplateData) -> DispatchResult {
        if !self.push.is_enabled() {
            return Err(NotificationError::Delivery(
                "Push delivery is not configured".to_string(),
            ));
        }

        let rendered = render(data);
        if !PreferenceGate::is_enabled(&self.pool, user_id, rendered.notification_type, Channel::Push)
            .await
        {
            return Ok(DispatchOutcome::skipped(SkipReason::PreferenceDisabled));
        }

        let mut payload =
            PushPayload::new(rendered.title, rendered.message, rendered.notification_type);
        if let Some(url) = rendered.reference_url {
            payload.url = url;
        }

        let report = self.push.send(user_id, &payload).await;
        if report.success {
            Ok(DispatchOutcome::Delivered {
                notification_ids: Vec::new(),
            })
        } else {
            Err(NotificationError::Delivery(
                report.error.unwrap_or_else(|| "all endpoints failed".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::models::{CreatePushSubscription, NotificationType, UpdatePreference};
    use crate::services::push::server::tests::FakeGateway;
    use crate::services::store::ListQuery;
    use crate::services::templates::SystemData;
    use crate::test_support::{test_dispatcher, test_dispatcher_with_push};

    fn system(message: &str) -> TemplateData {
        TemplateData::SystemTest(SystemData {
            message: message.to_string(),
        })
    }

    #[tokio::test]
    async fn email_and_sms_are_rejected() {
        let dispatcher = test_dispatcher().await;
        for channel in [Channel::Email, Channel::Sms] {
            let err = dispatcher
                .deliver(channel, "u1", system("hi"))
                .await
                .unwrap_err();
            assert!(matches!(err, NotificationError::UnsupportedChannel(c) if c == channel));
        }
    }

    #[tokio::test]
    async fn in_app_delivery_stores_rendered_row() {
        let dispatcher = test_dispatcher().await;
        let outcome = dispatcher
            .deliver(Channel::InApp, "u1", system("Hello there"))
            .await
            .unwrap();
        assert_eq!(outcome.delivered_count(), 1);

        let page = dispatcher
            .store()
            .list("u1", ListQuery::default())
            .await
            .unwrap();
        assert_eq!(page.items[0].title, "Test Notification");
        assert_eq!(page.items[0].message, "Hello there");
        assert_eq!(page.items[0].notification_type, NotificationType::System);
    }

    #[tokio::test]
    async fn blank_recipient_is_a_skip() {
        let dispatcher = test_dispatcher().await;
        let outcome = dispatcher
            .notify_user(Some("  "), system("x"), Refs::default())
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::skipped(SkipReason::RecipientUnresolved));
    }

    #[tokio::test]
    async fn stored_notification_is_also_pushed_unless_push_disabled() {
        let gateway = Arc::new(FakeGateway::default());
        let dispatcher = test_dispatcher_with_push(gateway.clone()).await;
        dispatcher
            .push()
            .register(CreatePushSubscription {
                user_id: "u1".into(),
                endpoint: "https://push.example.com/a".into(),
                p256dh: "k".into(),
                auth: "a".into(),
                user_agent: None,
            })
            .await
            .unwrap();

        dispatcher
            .deliver(Channel::InApp, "u1", system("first"))
            .await
            .unwrap();
        assert_eq!(gateway.calls.lock().unwrap().len(), 1);

        PreferenceGate::update(
            dispatcher.store().pool(),
            "u1",
            &[UpdatePreference {
                notification_type: NotificationType::System,
                channel: Channel::Push,
                enabled: false,
            }],
        )
        .await
        .unwrap();

        let outcome = dispatcher
            .deliver(Channel::InApp, "u1", system("second"))
            .await
            .unwrap();
        assert!(outcome.is_delivered());
        assert_eq!(gateway.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn push_channel_without_gateway_is_a_delivery_error() {
        let dispatcher = test_dispatcher().await;
        let err = dispatcher
            .deliver(Channel::Push, "u1", system("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Delivery(_)));
    }

    #[tokio::test]
    async fn detached_dispatch_runs_to_completion() {
        let dispatcher = test_dispatcher().await;
        let handle = dispatcher.dispatch_detached("test", |d| async move {
            d.deliver(Channel::InApp, "u1", system("bg")).await
        });
        handle.await.unwrap();

        let count = dispatcher
            .store()
            .unread_count("u1", Default::default())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn sweep_report_tallies_outcomes() {
        let mut report = SweepReport::default();
        report.record(&Ok(DispatchOutcome::Delivered {
            notification_ids: vec!["a".into(), "b".into()],
        }));
        report.record(&Ok(DispatchOutcome::skipped(SkipReason::PreferenceDisabled)));
        report.record(&Err(NotificationError::Delivery("x".into())));
        assert_eq!(report.notified, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
    }
}
