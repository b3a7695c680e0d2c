use serde::Serialize;

use crate::db::models::{Notification, NotificationType};

const DEFAULT_ICON: &str = "/icons/notification-192.png";
const DEFAULT_BADGE: &str = "/icons/badge-72.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Urgency {
    VeryLow,
    Low,
    Normal,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::VeryLow => "very-low",
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PushAction {
    pub action: &'static str,
    pub title: &'static str,
}

const VIEW: PushAction = PushAction {
    action: "view",
    title: "View",
};
const DISMISS: PushAction = PushAction {
    action: "dismiss",
    title: "Dismiss",
};
const VIEW_ORDER: PushAction = PushAction {
    action: "view-order",
    title: "View Order",
};
const TRACK: PushAction = PushAction {
    action: "track",
    title: "Track",
};
const RETRY_PAYMENT: PushAction = PushAction {
    action: "retry-payment",
    title: "Retry Payment",
};
const RESTOCK: PushAction = PushAction {
    action: "restock",
    title: "Restock",
};
const REVIEW: PushAction = PushAction {
    action: "review",
    title: "Review",
};

/// How a notification type shows up in the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presentation {
    pub icon: &'static str,
    pub badge: &'static str,
    pub actions: &'static [PushAction],
    pub require_interaction: bool,
    pub urgency: Urgency,
}

pub fn presentation_for(notification_type: NotificationType) -> Presentation {
    use NotificationType::*;

    let (icon, actions, require_interaction, urgency): (_, &'static [PushAction], _, _) =
        match notification_type {
            NewOrder => ("/icons/order.png", &[VIEW_ORDER, DISMISS], true, Urgency::High),
            OrderStatusChange => ("/icons/order.png", &[TRACK, DISMISS], false, Urgency::Normal),
            PaymentSuccess => ("/icons/payment.png", &[VIEW_ORDER], false, Urgency::Normal),
            PaymentFailed => ("/icons/payment.png", &[RETRY_PAYMENT, DISMISS], true, Urgency::High),
            PayoutRequested | PayoutProcessed => {
                ("/icons/payout.png", &[VIEW], false, Urgency::Normal)
            }
            PayoutFailed => ("/icons/payout.png", &[VIEW, DISMISS], true, Urgency::High),
            RefundRequested | RefundStatusChange => {
                ("/icons/refund.png", &[VIEW, DISMISS], false, Urgency::Normal)
            }
            LowStockAlert => ("/icons/inventory.png", &[RESTOCK, DISMISS], false, Urgency::Normal),
            OutOfStock => ("/icons/inventory.png", &[RESTOCK, DISMISS], true, Urgency::High),
            CouponUsageAlert | CouponExpiring => {
                ("/icons/coupon.png", &[VIEW], false, Urgency::Low)
            }
            ProductStatusChange => ("/icons/product.png", &[VIEW], false, Urgency::Normal),
            AgentAssignment => ("/icons/delivery.png", &[VIEW_ORDER, DISMISS], true, Urgency::High),
            AdminAlert => ("/icons/admin.png", &[REVIEW, DISMISS], true, Urgency::High),
            System => (DEFAULT_ICON, &[], false, Urgency::Low),
        };

    Presentation {
        icon,
        badge: DEFAULT_BADGE,
        actions,
        require_interaction,
        urgency,
    }
}

// ============================================================================
// Payload
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub url: String,
    pub notification_type: NotificationType,
    pub icon: String,
    pub badge: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub require_interaction: bool,
    pub actions: Vec<PushAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    #[serde(skip)]
    pub urgency: Urgency,
}

impl PushPayload {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        notification_type: NotificationType,
    ) -> Self {
        let presentation = presentation_for(notification_type);
        Self {
            title: title.into(),
            body: body.into(),
            url: "/notifications".to_string(),
            notification_type,
            icon: presentation.icon.to_string(),
            badge: presentation.badge.to_string(),
            tag: None,
            require_interaction: presentation.require_interaction,
            actions: presentation.actions.to_vec(),
            notification_id: None,
            urgency: presentation.urgency,
        }
    }

    pub fn from_notification(n: &Notification) -> Self {
        let mut payload = Self::new(n.title.clone(), n.message.clone(), n.notification_type);
        if let Some(url) = &n.reference_url {
            payload.url = url.clone();
        }
        payload.tag = Some(n.notification_type.as_str().to_lowercase());
        payload.notification_id = Some(n.id.clone());
        payload
    }

    /// Serialize, shrinking text fields until the JSON fits in `max_bytes`.
    pub fn to_bytes_capped(&self, max_bytes: usize) -> Result<Vec<u8>, serde_json::Error> {
        let mut trimmed = self.clone();
        trimmed.title = truncate_string(&trimmed.title, 120);
        trimmed.body = truncate_string(&trimmed.body, 600);

        let bytes = serde_json::to_vec(&trimmed)?;
        if bytes.len() <= max_bytes {
            return Ok(bytes);
        }

        trimmed.title = truncate_string(&trimmed.title, 80);
        trimmed.body = truncate_string(&trimmed.body, 120);
        trimmed.actions.clear();
        serde_json::to_vec(&trimmed)
    }
}

pub(crate) fn truncate_string(input: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let mut chars = input.chars();
    let mut out: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        out.push('…');
    }
    out
}
