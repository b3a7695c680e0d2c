use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{Channel, NotificationType};

/// A stored opt-in/opt-out. Absence of a row means enabled.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub id: String,
    pub user_id: String,
    #[sqlx(try_from = "String")]
    pub notification_type: NotificationType,
    #[sqlx(try_from = "String")]
    pub channel: Channel,
    pub enabled: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdatePreference {
    pub notification_type: NotificationType,
    pub channel: Channel,
    pub enabled: bool,
}
