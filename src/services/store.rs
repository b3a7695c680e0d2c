use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::models::{Channel, CreateNotification, Notification, NotificationType};
use crate::db::NotificationRepository;
use crate::error::{AppError, AppResult};
use crate::services::preferences::PreferenceGate;
use crate::services::realtime::{ChangeFeed, InboxSource, NotificationChange};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Notification),
    /// The recipient opted out of this type on the in-app channel.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemError {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub created: Vec<Notification>,
    pub skipped: usize,
    pub errors: Vec<BatchItemError>,
}

impl BatchReport {
    pub fn created_count(&self) -> usize {
        self.created.len()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub unread_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub items: Vec<Notification>,
    pub total_count: i64,
    pub page: i64,
    pub limit: i64,
    pub page_count: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnreadFilter {
    pub notification_type: Option<NotificationType>,
    pub max_age: Option<Duration>,
}

/// Persistence for in-app notifications. Every mutation is published on the
/// change feed after it commits.
#[derive(Clone)]
pub struct NotificationStore {
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl NotificationStore {
    pub fn new(pool: SqlitePool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub async fn create(&self, new: CreateNotification) -> AppResult<CreateOutcome> {
        new.validate().map_err(AppError::Validation)?;

        if !PreferenceGate::is_enabled(
            &self.pool,
            &new.user_id,
            new.notification_type,
            Channel::InApp,
        )
        .await
        {
            tracing::debug!(
                user_id = %new.user_id,
                notification_type = %new.notification_type,
                "In-app notification disabled by preference, skipping"
            );
            return Ok(CreateOutcome::Skipped);
        }

        let row = NotificationRepository::create(&self.pool, &new).await?;
        self.feed.publish(NotificationChange::inserted(&row));
        Ok(CreateOutcome::Created(row))
    }

    /// Validate and gate each item, then write the survivors in one
    /// transaction. A storage failure fails the whole batch.
    pub async fn create_batch(&self, items: Vec<CreateNotification>) -> AppResult<BatchReport> {
        let mut report = BatchReport::default();
        let mut accepted = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            if let Err(message) = item.validate() {
                report.errors.push(BatchItemError { index, message });
                continue;
            }
            if !PreferenceGate::is_enabled(
                &self.pool,
                &item.user_id,
                item.notification_type,
                Channel::InApp,
            )
            .await
            {
                report.skipped += 1;
                continue;
            }
            accepted.push(item);
        }

        report.created = NotificationRepository::create_many(&self.pool, &accepted).await?;
        for row in &report.created {
            self.feed.publish(NotificationChange::inserted(row));
        }

        tracing::debug!(
            created = report.created.len(),
            skipped = report.skipped,
            invalid = report.errors.len(),
            "Stored notification batch"
        );
        Ok(report)
    }

    pub async fn find(&self, id: &str) -> AppResult<Notification> {
        NotificationRepository::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))
    }

    pub async fn list(&self, user_id: &str, query: ListQuery) -> AppResult<Page> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| AppError::BadRequest(format!("page {} is out of range", page)))?;

        let (items, total_count) = tokio::try_join!(
            NotificationRepository::list_for_user(
                &self.pool,
                user_id,
                query.unread_only,
                limit,
                offset
            ),
            NotificationRepository::count_for_user(&self.pool, user_id, query.unread_only),
        )?;

        let page_count = (total_count as f64 / limit as f64).ceil() as i64;

        Ok(Page {
            items,
            total_count,
            page,
            limit,
            page_count,
        })
    }

    /// Idempotent: an already-read row is returned unchanged.
    pub async fn mark_read(&self, id: &str) -> AppResult<Notification> {
        self.set_read(id, true).await
    }

    pub async fn mark_unread(&self, id: &str) -> AppResult<Notification> {
        self.set_read(id, false).await
    }

    async fn set_read(&self, id: &str, is_read: bool) -> AppResult<Notification> {
        let current = self.find(id).await?;
        if current.is_read == is_read {
            return Ok(current);
        }

        let updated = NotificationRepository::set_read(&self.pool, id, is_read)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;
        self.feed.publish(NotificationChange::updated(&updated));
        Ok(updated)
    }

    pub async fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
        self.set_all_read(user_id, true).await
    }

    pub async fn mark_all_unread(&self, user_id: &str) -> AppResult<u64> {
        self.set_all_read(user_id, false).await
    }

    async fn set_all_read(&self, user_id: &str, is_read: bool) -> AppResult<u64> {
        let changed = NotificationRepository::set_all_read(&self.pool, user_id, is_read).await?;
        if !changed.is_empty() {
            self.feed.publish(NotificationChange::bulk_updated(user_id));
        }
        Ok(changed.len() as u64)
    }

    pub async fn unread_count(&self, user_id: &str, filter: UnreadFilter) -> AppResult<i64> {
        let created_after = match filter.max_age {
            Some(age) => Some(Utc::now().naive_utc().checked_sub_signed(age).ok_or_else(|| {
                AppError::BadRequest("max_age reaches before the earliest representable time".into())
            })?),
            None => None,
        };
        NotificationRepository::unread_count(
            &self.pool,
            user_id,
            filter.notification_type,
            created_after,
        )
        .await
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let existing = self.find(id).await?;
        if NotificationRepository::delete(&self.pool, id).await? {
            self.feed.publish(NotificationChange::deleted(&existing));
        }
        Ok(())
    }
}

#[async_trait]
impl InboxSource for NotificationStore {
    async fn fetch_recent(&self, user_id: &str, limit: i64) -> AppResult<Vec<Notification>> {
        let page = self
            .list(
                user_id,
                ListQuery {
                    page: Some(1),
                    limit: Some(limit),
                    unread_only: false,
                },
            )
            .await?;
        Ok(page.items)
    }

    async fn fetch_unread_count(&self, user_id: &str) -> AppResult<i64> {
        self.unread_count(user_id, UnreadFilter::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::UpdatePreference;
    use crate::services::realtime::ChangeKind;
    use crate::test_support::{new_notification, test_store};

    #[tokio::test]
    async fn create_respects_in_app_preference() {
        let store = test_store().await;
        PreferenceGate::update(
            store.pool(),
            "u1",
            &[UpdatePreference {
                notification_type: NotificationType::PaymentSuccess,
                channel: Channel::InApp,
                enabled: false,
            }],
        )
        .await
        .unwrap();

        let outcome = store
            .create(new_notification("u1", NotificationType::PaymentSuccess))
            .await
            .unwrap();
        assert!(matches!(outcome, CreateOutcome::Skipped));
        assert_eq!(store.list("u1", ListQuery::default()).await.unwrap().total_count, 0);

        let outcome = store
            .create(new_notification("u1", NotificationType::NewOrder))
            .await
            .unwrap();
        match outcome {
            CreateOutcome::Created(n) => assert!(!n.is_read),
            CreateOutcome::Skipped => panic!("expected a stored notification"),
        }
    }

    #[tokio::test]
    async fn batch_creates_one_unread_row_per_recipient() {
        let store = test_store().await;
        let report = store
            .create_batch(vec![
                new_notification("A", NotificationType::NewOrder),
                new_notification("B", NotificationType::NewOrder),
            ])
            .await
            .unwrap();

        assert_eq!(report.created_count(), 2);
        assert!(report.errors.is_empty());
        assert_eq!(store.unread_count("A", UnreadFilter::default()).await.unwrap(), 1);
        assert_eq!(store.unread_count("B", UnreadFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn batch_reports_invalid_items_without_failing() {
        let store = test_store().await;
        let mut bad = new_notification("A", NotificationType::NewOrder);
        bad.title = "  ".to_string();

        let report = store
            .create_batch(vec![bad, new_notification("B", NotificationType::NewOrder)])
            .await
            .unwrap();

        assert_eq!(report.created_count(), 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].index, 0);
    }

    #[tokio::test]
    async fn second_page_returns_the_oldest_rows() {
        let store = test_store().await;
        let mut ids = Vec::new();
        for i in 0..15 {
            let mut n = new_notification("u1", NotificationType::System);
            n.title = format!("n{}", i);
            if let CreateOutcome::Created(row) = store.create(n).await.unwrap() {
                ids.push(row.id);
            }
        }

        let page = store
            .list(
                "u1",
                ListQuery {
                    page: Some(2),
                    limit: Some(10),
                    unread_only: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(page.total_count, 15);
        assert_eq!(page.page_count, 2);
        assert_eq!(page.items.len(), 5);
        let titles: Vec<_> = page.items.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["n4", "n3", "n2", "n1", "n0"]);
    }

    #[tokio::test]
    async fn list_defaults_to_first_ten() {
        let store = test_store().await;
        for _ in 0..12 {
            store
                .create(new_notification("u1", NotificationType::System))
                .await
                .unwrap();
        }
        let page = store.list("u1", ListQuery::default()).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 10);
        assert_eq!(page.items.len(), 10);
    }

    #[tokio::test]
    async fn out_of_range_page_is_rejected() {
        let store = test_store().await;
        let err = store
            .list(
                "u1",
                ListQuery {
                    page: Some(i64::MAX),
                    limit: Some(10),
                    unread_only: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn max_age_past_the_calendar_is_rejected() {
        let store = test_store().await;
        let filter = UnreadFilter {
            notification_type: None,
            max_age: Duration::try_seconds(9_000_000_000_000_000),
        };
        assert!(filter.max_age.is_some());
        let err = store.unread_count("u1", filter).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_counts_converge() {
        let store = test_store().await;
        let CreateOutcome::Created(n) = store
            .create(new_notification("u1", NotificationType::System))
            .await
            .unwrap()
        else {
            panic!("expected a stored notification");
        };

        let first = store.mark_read(&n.id).await.unwrap();
        let second = store.mark_read(&n.id).await.unwrap();
        assert!(first.is_read);
        assert_eq!(first, second);

        store
            .create(new_notification("u1", NotificationType::System))
            .await
            .unwrap();
        assert_eq!(store.mark_all_read("u1").await.unwrap(), 1);
        assert_eq!(store.mark_all_read("u1").await.unwrap(), 0);
        assert_eq!(store.unread_count("u1", UnreadFilter::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let store = test_store().await;
        assert!(matches!(
            store.mark_read("missing").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.delete("missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn mutations_are_published() {
        let store = test_store().await;
        let mut changes = store.feed().subscribe("u1");

        let CreateOutcome::Created(n) = store
            .create(new_notification("u1", NotificationType::System))
            .await
            .unwrap()
        else {
            panic!("expected a stored notification");
        };
        store.mark_read(&n.id).await.unwrap();
        store.delete(&n.id).await.unwrap();

        let kinds = [
            changes.next().await.unwrap().kind,
            changes.next().await.unwrap().kind,
            changes.next().await.unwrap().kind,
        ];
        assert_eq!(kinds, [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]);
    }

    #[tokio::test]
    async fn unread_count_filters_by_type() {
        let store = test_store().await;
        store
            .create(new_notification("u1", NotificationType::LowStockAlert))
            .await
            .unwrap();
        store
            .create(new_notification("u1", NotificationType::NewOrder))
            .await
            .unwrap();

        let filter = UnreadFilter {
            notification_type: Some(NotificationType::LowStockAlert),
            max_age: Some(Duration::hours(1)),
        };
        assert_eq!(store.unread_count("u1", filter).await.unwrap(), 1);
    }
}
