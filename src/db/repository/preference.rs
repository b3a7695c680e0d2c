use chrono::Utc;
use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

const COLUMNS: &str = "id, user_id, notification_type, channel, enabled, created_at, updated_at";

// ============================================================================
// Notification Preference Repository
// ============================================================================

pub struct PreferenceRepository;

impl PreferenceRepository {
    pub async fn find(
        pool: &SqlitePool,
        user_id: &str,
        notification_type: NotificationType,
        channel: Channel,
    ) -> AppResult<Option<NotificationPreference>> {
        sqlx::query_as::<_, NotificationPreference>(&format!(
            r#"
            SELECT {}
            FROM notification_preferences
            WHERE user_id = ? AND notification_type = ? AND channel = ?
            "#,
            COLUMNS
        ))
        .bind(user_id)
        .bind(notification_type.as_str())
        .bind(channel.as_str())
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn list_for_user(
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<Vec<NotificationPreference>> {
        sqlx::query_as::<_, NotificationPreference>(&format!(
            r#"
            SELECT {}
            FROM notification_preferences
            WHERE user_id = ?
            ORDER BY notification_type, channel
            "#,
            COLUMNS
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Apply every update in one transaction; either all land or none.
    pub async fn upsert_many(
        pool: &SqlitePool,
        user_id: &str,
        updates: &[UpdatePreference],
    ) -> AppResult<Vec<NotificationPreference>> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;
        let mut saved = Vec::with_capacity(updates.len());
        for update in updates {
            saved.push(Self::upsert_with(&mut *tx, user_id, update).await?);
        }
        tx.commit().await.map_err(AppError::Database)?;
        Ok(saved)
    }

    async fn upsert_with<'e, E>(
        executor: E,
        user_id: &str,
        update: &UpdatePreference,
    ) -> AppResult<NotificationPreference>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, NotificationPreference>(&format!(
            r#"
            INSERT INTO notification_preferences (
                id, user_id, notification_type, channel, enabled, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, notification_type, channel)
            DO UPDATE SET enabled = excluded.enabled, updated_at = excluded.updated_at
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(update.notification_type.as_str())
        .bind(update.channel.as_str())
        .bind(update.enabled)
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await
        .map_err(AppError::Database)
    }

    pub async fn delete_for_user(pool: &SqlitePool, user_id: &str) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM notification_preferences WHERE user_id = ?")
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}
