use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of notification categories stored on every row and used as the
/// preference key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    OrderStatusChange,
    NewOrder,
    PaymentSuccess,
    PaymentFailed,
    PayoutRequested,
    PayoutProcessed,
    PayoutFailed,
    RefundRequested,
    RefundStatusChange,
    LowStockAlert,
    OutOfStock,
    CouponUsageAlert,
    CouponExpiring,
    ProductStatusChange,
    AgentAssignment,
    AdminAlert,
    System,
}

impl NotificationType {
    pub const ALL: [NotificationType; 17] = [
        NotificationType::OrderStatusChange,
        NotificationType::NewOrder,
        NotificationType::PaymentSuccess,
        NotificationType::PaymentFailed,
        NotificationType::PayoutRequested,
        NotificationType::PayoutProcessed,
        NotificationType::PayoutFailed,
        NotificationType::RefundRequested,
        NotificationType::RefundStatusChange,
        NotificationType::LowStockAlert,
        NotificationType::OutOfStock,
        NotificationType::CouponUsageAlert,
        NotificationType::CouponExpiring,
        NotificationType::ProductStatusChange,
        NotificationType::AgentAssignment,
        NotificationType::AdminAlert,
        NotificationType::System,
    ];

    /// Convert from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|t| t.as_str() == upper)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::OrderStatusChange => "ORDER_STATUS_CHANGE",
            NotificationType::NewOrder => "NEW_ORDER",
            NotificationType::PaymentSuccess => "PAYMENT_SUCCESS",
            NotificationType::PaymentFailed => "PAYMENT_FAILED",
            NotificationType::PayoutRequested => "PAYOUT_REQUESTED",
            NotificationType::PayoutProcessed => "PAYOUT_PROCESSED",
            NotificationType::PayoutFailed => "PAYOUT_FAILED",
            NotificationType::RefundRequested => "REFUND_REQUESTED",
            NotificationType::RefundStatusChange => "REFUND_STATUS_CHANGE",
            NotificationType::LowStockAlert => "LOW_STOCK_ALERT",
            NotificationType::OutOfStock => "OUT_OF_STOCK",
            NotificationType::CouponUsageAlert => "COUPON_USAGE_ALERT",
            NotificationType::CouponExpiring => "COUPON_EXPIRING",
            NotificationType::ProductStatusChange => "PRODUCT_STATUS_CHANGE",
            NotificationType::AgentAssignment => "AGENT_ASSIGNMENT",
            NotificationType::AdminAlert => "ADMIN_ALERT",
            NotificationType::System => "SYSTEM",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for NotificationType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("Invalid notification type: {}", value))
    }
}

/// Delivery medium. Only `InApp` and `Push` have a delivery path; the others
/// can hold preferences but are rejected by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    InApp,
    Email,
    Sms,
    Push,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::InApp, Channel::Email, Channel::Sms, Channel::Push];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN_APP" => Some(Channel::InApp),
            "EMAIL" => Some(Channel::Email),
            "SMS" => Some(Channel::Sms),
            "PUSH" => Some(Channel::Push),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::InApp => "IN_APP",
            Channel::Email => "EMAIL",
            Channel::Sms => "SMS",
            Channel::Push => "PUSH",
        }
    }

    pub fn is_deliverable(self) -> bool {
        matches!(self, Channel::InApp | Channel::Push)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Channel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("Invalid channel: {}", value))
    }
}
