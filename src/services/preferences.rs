use sqlx::SqlitePool;

use crate::db::models::{Channel, NotificationPreference, NotificationType, UpdatePreference};
use crate::db::PreferenceRepository;
use crate::error::AppResult;

/// Opt-in/opt-out lookups. A missing row means enabled, and so does a failed
/// lookup.
pub struct PreferenceGate;

impl PreferenceGate {
    pub async fn is_enabled(
        pool: &SqlitePool,
        user_id: &str,
        notification_type: NotificationType,
        channel: Channel,
    ) -> bool {
        match PreferenceRepository::find(pool, user_id, notification_type, channel).await {
            Ok(Some(pref)) => pref.enabled,
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    notification_type = %notification_type,
                    channel = %channel,
                    "Preference lookup failed, delivering anyway: {:?}",
                    e
                );
                true
            }
        }
    }

    pub async fn list(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<NotificationPreference>> {
        PreferenceRepository::list_for_user(pool, user_id).await
    }

    pub async fn update(
        pool: &SqlitePool,
        user_id: &str,
        updates: &[UpdatePreference],
    ) -> AppResult<Vec<NotificationPreference>> {
        PreferenceRepository::upsert_many(pool, user_id, updates).await
    }

    /// Drop every stored preference so the user is back on the all-enabled default.
    pub async fn reset(pool: &SqlitePool, user_id: &str) -> AppResult<u64> {
        let removed = PreferenceRepository::delete_for_user(pool, user_id).await?;
        tracing::info!(user_id = %user_id, removed, "Reset notification preferences");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_pool;

    #[tokio::test]
    async fn missing_row_means_enabled() {
        let pool = test_pool().await;
        assert!(
            PreferenceGate::is_enabled(&pool, "u1", NotificationType::NewOrder, Channel::InApp)
                .await
        );
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_type_and_channel() {
        let pool = test_pool().await;
        let off = UpdatePreference {
            notification_type: NotificationType::NewOrder,
            channel: Channel::InApp,
            enabled: false,
        };
        PreferenceGate::update(&pool, "u1", &[off]).await.unwrap();
        PreferenceGate::update(&pool, "u1", &[off]).await.unwrap();

        assert_eq!(PreferenceGate::list(&pool, "u1").await.unwrap().len(), 1);
        assert!(
            !PreferenceGate::is_enabled(&pool, "u1", NotificationType::NewOrder, Channel::InApp)
                .await
        );
        assert!(
            PreferenceGate::is_enabled(&pool, "u1", NotificationType::NewOrder, Channel::Push)
                .await
        );
        assert!(
            PreferenceGate::is_enabled(&pool, "u2", NotificationType::NewOrder, Channel::InApp)
                .await
        );
    }

    #[tokio::test]
    async fn reset_restores_defaults() {
        let pool = test_pool().await;
        let off = UpdatePreference {
            notification_type: NotificationType::PayoutFailed,
            channel: Channel::InApp,
            enabled: false,
        };
        PreferenceGate::update(&pool, "u1", &[off]).await.unwrap();
        assert_eq!(PreferenceGate::reset(&pool, "u1").await.unwrap(), 1);
        assert!(
            PreferenceGate::is_enabled(&pool, "u1", NotificationType::PayoutFailed, Channel::InApp)
                .await
        );
    }

    #[tokio::test]
    async fn lookup_failure_fails_open() {
        let pool = test_pool().await;
        pool.close().await;
        assert!(
            PreferenceGate::is_enabled(&pool, "u1", NotificationType::NewOrder, Channel::InApp)
                .await
        );
    }

    #[tokio::test]
    async fn failed_update_leaves_no_partial_rows() {
        let pool = test_pool().await;
        sqlx::query(
            "CREATE TRIGGER refuse_sms BEFORE INSERT ON notification_preferences \
             WHEN NEW.channel = 'SMS' BEGIN SELECT RAISE(ABORT, 'sms refused'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let updates = [
            UpdatePreference {
                notification_type: NotificationType::NewOrder,
                channel: Channel::InApp,
                enabled: false,
            },
            UpdatePreference {
                notification_type: NotificationType::NewOrder,
                channel: Channel::Sms,
                enabled: false,
            },
        ];
        assert!(PreferenceGate::update(&pool, "u1", &updates).await.is_err());
        assert!(PreferenceGate::list(&pool, "u1").await.unwrap().is_empty());
    }
}
