use chrono::{NaiveDateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

const COLUMNS: &str = "id, user_id, title, message, notification_type, order_id, return_id, \
                       reference_url, is_read, created_at";

/// SQLite caps bound parameters per statement; ten columns per row.
const ROWS_PER_INSERT: usize = 90;

// ============================================================================
// Notification Repository
// ============================================================================

pub struct NotificationRepository;

impl NotificationRepository {
    fn build_row(new: &CreateNotification, created_at: NaiveDateTime) -> Notification {
        Notification {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id.clone(),
            title: new.title.clone(),
            message: new.message.clone(),
            notification_type: new.notification_type,
            order_id: new.order_id.clone(),
            return_id: new.return_id.clone(),
            reference_url: new.reference_url.clone(),
            is_read: false,
            created_at,
        }
    }

    pub async fn create(pool: &SqlitePool, new: &CreateNotification) -> AppResult<Notification> {
        let row = Self::build_row(new, Utc::now().naive_utc());

        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, user_id, title, message, notification_type,
                order_id, return_id, reference_url, is_read, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.user_id)
        .bind(&row.title)
        .bind(&row.message)
        .bind(row.notification_type.as_str())
        .bind(&row.order_id)
        .bind(&row.return_id)
        .bind(&row.reference_url)
        .bind(row.is_read)
        .bind(row.created_at)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Insert all rows inside one transaction; either every row lands or none.
    pub async fn create_many(
        pool: &SqlitePool,
        items: &[CreateNotification],
    ) -> AppResult<Vec<Notification>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now().naive_utc();
        let rows: Vec<Notification> = items.iter().map(|n| Self::build_row(n, now)).collect();

        let mut tx = pool.begin().await.map_err(AppError::Database)?;
        for chunk in rows.chunks(ROWS_PER_INSERT) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "INSERT INTO notifications ({}) ",
                COLUMNS
            ));
            qb.push_values(chunk, |mut b, n| {
                b.push_bind(n.id.clone())
                    .push_bind(n.user_id.clone())
                    .push_bind(n.title.clone())
                    .push_bind(n.message.clone())
                    .push_bind(n.notification_type.as_str())
                    .push_bind(n.order_id.clone())
                    .push_bind(n.return_id.clone())
                    .push_bind(n.reference_url.clone())
                    .push_bind(n.is_read)
                    .push_bind(n.created_at);
            });
            qb.build()
                .execute(&mut *tx)
                .await
                .map_err(AppError::Database)?;
        }
        tx.commit().await.map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Notification>> {
        sqlx::query_as::<_, Notification>(&format!(
            "SELECT {} FROM notifications WHERE id = ?",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Newest first; rows written in the same instant keep insertion order.
    pub async fn list_for_user(
        pool: &SqlitePool,
        user_id: &str,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Notification>> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE user_id = ? AND (? = 0 OR is_read = 0)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#,
            COLUMNS
        ))
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn count_for_user(
        pool: &SqlitePool,
        user_id: &str,
        unread_only: bool,
    ) -> AppResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND (? = 0 OR is_read = 0)",
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(count.0)
    }

    pub async fn unread_count(
        pool: &SqlitePool,
        user_id: &str,
        notification_type: Option<NotificationType>,
        created_after: Option<NaiveDateTime>,
    ) -> AppResult<i64> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT COUNT(*) FROM notifications WHERE is_read = 0 AND user_id = ",
        );
        qb.push_bind(user_id.to_string());
        if let Some(t) = notification_type {
            qb.push(" AND notification_type = ").push_bind(t.as_str());
        }
        if let Some(after) = created_after {
            qb.push(" AND created_at >= ").push_bind(after);
        }

        let count = qb
            .build_query_as::<(i64,)>()
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(count.0)
    }

    pub async fn set_read(
        pool: &SqlitePool,
        id: &str,
        is_read: bool,
    ) -> AppResult<Option<Notification>> {
        sqlx::query_as::<_, Notification>(&format!(
            "UPDATE notifications SET is_read = ? WHERE id = ? RETURNING {}",
            COLUMNS
        ))
        .bind(is_read)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Returns ids of the rows whose flag actually changed.
    pub async fn set_all_read(
        pool: &SqlitePool,
        user_id: &str,
        is_read: bool,
    ) -> AppResult<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as(
            "UPDATE notifications SET is_read = ? WHERE user_id = ? AND is_read <> ? RETURNING id",
        )
        .bind(is_read)
        .bind(user_id)
        .bind(is_read)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    pub async fn delete(pool: &SqlitePool, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{new_notification, test_pool};

    #[tokio::test]
    async fn create_many_inserts_every_row() {
        let pool = test_pool().await;
        let items: Vec<_> = (0..120)
            .map(|i| new_notification(&format!("user-{}", i % 3), NotificationType::NewOrder))
            .collect();

        let rows = NotificationRepository::create_many(&pool, &items).await.unwrap();
        assert_eq!(rows.len(), 120);
        assert_eq!(
            NotificationRepository::count_for_user(&pool, "user-0", false)
                .await
                .unwrap(),
            40
        );
    }

    #[tokio::test]
    async fn set_all_read_reports_only_changed_rows() {
        let pool = test_pool().await;
        let a = NotificationRepository::create(&pool, &new_notification("u", NotificationType::System))
            .await
            .unwrap();
        NotificationRepository::create(&pool, &new_notification("u", NotificationType::System))
            .await
            .unwrap();
        NotificationRepository::set_read(&pool, &a.id, true).await.unwrap();

        let changed = NotificationRepository::set_all_read(&pool, "u", true).await.unwrap();
        assert_eq!(changed.len(), 1);
        let changed = NotificationRepository::set_all_read(&pool, "u", true).await.unwrap();
        assert!(changed.is_empty());
    }

    #[tokio::test]
    async fn unread_count_applies_filters() {
        let pool = test_pool().await;
        NotificationRepository::create(&pool, &new_notification("u", NotificationType::LowStockAlert))
            .await
            .unwrap();
        NotificationRepository::create(&pool, &new_notification("u", NotificationType::NewOrder))
            .await
            .unwrap();

        let all = NotificationRepository::unread_count(&pool, "u", None, None).await.unwrap();
        assert_eq!(all, 2);
        let stock = NotificationRepository::unread_count(
            &pool,
            "u",
            Some(NotificationType::LowStockAlert),
            None,
        )
        .await
        .unwrap();
        assert_eq!(stock, 1);
        let future = Utc::now().naive_utc() + chrono::Duration::hours(1);
        let recent = NotificationRepository::unread_count(&pool, "u", None, Some(future))
            .await
            .unwrap();
        assert_eq!(recent, 0);
    }
}
