use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

const COLUMNS: &str =
    "id, user_id, endpoint, p256dh, auth, user_agent, created_at, last_used_at, is_active";

// ============================================================================
// Push Subscription Repository
// ============================================================================

pub struct PushSubscriptionRepository;

impl PushSubscriptionRepository {
    /// Insert or refresh keys for `(user_id, endpoint)`; re-activates a
    /// previously invalidated row.
    pub async fn upsert(
        pool: &SqlitePool,
        new: &CreatePushSubscription,
    ) -> AppResult<PushSubscription> {
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, PushSubscription>(&format!(
            r#"
            INSERT INTO push_subscriptions (
                id, user_id, endpoint, p256dh, auth, user_agent, created_at, is_active
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT(user_id, endpoint) DO UPDATE SET
                p256dh = excluded.p256dh,
                auth = excluded.auth,
                user_agent = COALESCE(excluded.user_agent, push_subscriptions.user_agent),
                is_active = 1
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(&new.user_id)
        .bind(&new.endpoint)
        .bind(&new.p256dh)
        .bind(&new.auth)
        .bind(&new.user_agent)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn list_for_user(
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<Vec<PushSubscription>> {
        sqlx::query_as::<_, PushSubscription>(&format!(
            "SELECT {} FROM push_subscriptions WHERE user_id = ? ORDER BY created_at DESC",
            COLUMNS
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn list_active_for_user(
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<Vec<PushSubscription>> {
        sqlx::query_as::<_, PushSubscription>(&format!(
            "SELECT {} FROM push_subscriptions WHERE user_id = ? AND is_active = 1",
            COLUMNS
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn touch_last_used(pool: &SqlitePool, id: &str) -> AppResult<()> {
        sqlx::query("UPDATE push_subscriptions SET last_used_at = ? WHERE id = ?")
            .bind(Utc::now().naive_utc())
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn deactivate(pool: &SqlitePool, id: &str) -> AppResult<()> {
        sqlx::query("UPDATE push_subscriptions SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn delete_by_endpoint(
        pool: &SqlitePool,
        user_id: &str,
        endpoint: &str,
    ) -> AppResult<bool> {
        let result =
            sqlx::query("DELETE FROM push_subscriptions WHERE user_id = ? AND endpoint = ?")
                .bind(user_id)
                .bind(endpoint)
                .execute(pool)
                .await
                .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
