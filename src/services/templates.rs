//! Template registry and substitution engine.
//!
//! Every notification the service emits is rendered from a constant table of
//! templates keyed by [`TemplateKey`]. Callers supply a typed [`TemplateData`]
//! value; the untyped entry point [`render_value`] exists for admin tooling
//! that only has a key string and a JSON object.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::db::models::NotificationType;
use crate::error::NotificationError;

const NOT_AVAILABLE: &str = "N/A";
const UNKNOWN_PRODUCT: &str = "Unknown Product";
const NO_REASON: &str = "No reason provided";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateKey {
    OrderConfirmation,
    OrderStatusChange,
    OrderCancelled,
    NewOrderVendor,
    PaymentSuccess,
    PaymentFailed,
    PayoutRequested,
    PayoutProcessed,
    PayoutFailed,
    RefundRequested,
    RefundRequestedVendor,
    RefundApproved,
    RefundRejected,
    RefundProcessed,
    LowStock,
    OutOfStock,
    CouponUsage,
    CouponExpiring,
    ProductApproved,
    ProductRejected,
    AgentOrderAssigned,
    AgentOrderUpdate,
    AdminHighValueOrder,
    AdminPayoutRequest,
    AdminRefundRequest,
    AdminNewVendor,
    AdminProductPending,
    SystemTest,
}

impl TemplateKey {
    pub fn as_str(self) -> &'static str {
        definition(self).name
    }

    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        TEMPLATES.iter().find(|t| t.name == wanted).map(|t| t.key)
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the registry.
#[derive(Debug)]
pub struct TemplateDef {
    pub key: TemplateKey,
    pub name: &'static str,
    pub title: &'static str,
    pub message: &'static str,
    pub reference_url: Option<&'static str>,
    pub notification_type: NotificationType,
}

macro_rules! template {
    ($key:ident, $name:literal, $ty:ident, $title:literal, $message:literal, $url:expr) => {
        TemplateDef {
            key: TemplateKey::$key,
            name: $name,
            title: $title,
            message: $message,
            reference_url: $url,
            notification_type: NotificationType::$ty,
        }
    };
}

pub static TEMPLATES: &[TemplateDef] = &[
    template!(
        OrderConfirmation, "ORDER_CONFIRMATION", OrderStatusChange,
        "Order Confirmed",
        "Your order #{order_id} has been placed successfully. Total: {amount}.",
        Some("/orders/{order_ref}")
    ),
    template!(
        OrderStatusChange, "ORDER_STATUS_CHANGE", OrderStatusChange,
        "Order Update",
        "Your order #{order_id} is now {status}.",
        Some("/orders/{order_ref}")
    ),
    template!(
        OrderCancelled, "ORDER_CANCELLED", OrderStatusChange,
        "Order Cancelled",
        "Your order #{order_id} has been cancelled. Reason: {reason}.",
        Some("/orders/{order_ref}")
    ),
    template!(
        NewOrderVendor, "NEW_ORDER_VENDOR", NewOrder,
        "New Order Received",
        "You have a new order #{order_id} with {item_count} item(s). Your earnings: {earnings}.",
        Some("/vendor/orders/{order_ref}")
    ),
    template!(
        PaymentSuccess, "PAYMENT_SUCCESS", PaymentSuccess,
        "Payment Successful",
        "We received your payment of {amount} for order #{order_id}. Reference: {reference}.",
        Some("/orders/{order_ref}")
    ),
    template!(
        PaymentFailed, "PAYMENT_FAILED", PaymentFailed,
        "Payment Failed",
        "Payment for order #{order_id} could not be completed: {reason}. Please try again.",
        Some("/orders/{order_ref}")
    ),
    template!(
        PayoutRequested, "PAYOUT_REQUESTED", PayoutRequested,
        "Payout Requested",
        "Your payout request of {amount} has been received and is being reviewed.",
        Some("/vendor/payouts")
    ),
    template!(
        PayoutProcessed, "PAYOUT_PROCESSED", PayoutProcessed,
        "Payout Processed",
        "Your payout of {amount} has been processed. Reference: {reference}.",
        Some("/vendor/payouts")
    ),
    template!(
        PayoutFailed, "PAYOUT_FAILED", PayoutFailed,
        "Payout Failed",
        "Your payout of {amount} failed: {reason}.",
        Some("/vendor/payouts")
    ),
    template!(
        RefundRequested, "REFUND_REQUESTED", RefundRequested,
        "Refund Request Received",
        "We received your refund request for order #{order_id}. We'll review it shortly.",
        Some("/orders/{order_ref}")
    ),
    template!(
        RefundRequestedVendor, "REFUND_REQUESTED_VENDOR", RefundRequested,
        "Refund Requested",
        "{customer_name} requested a refund of {amount} for order #{order_id}. Reason: {reason}.",
        Some("/vendor/orders/{order_ref}")
    ),
    template!(
        RefundApproved, "REFUND_APPROVED", RefundStatusChange,
        "Refund Approved",
        "Your refund of {amount} for order #{order_id} has been approved.",
        Some("/orders/{order_ref}")
    ),
    template!(
        RefundRejected, "REFUND_REJECTED", RefundStatusChange,
        "Refund Rejected",
        "Your refund request for order #{order_id} was rejected. Reason: {reason}.",
        Some("/orders/{order_ref}")
    ),
    template!(
        RefundProcessed, "REFUND_PROCESSED", RefundStatusChange,
        "Refund Processed",
        "Your refund of {amount} for order #{order_id} has been processed.",
        Some("/orders/{order_ref}")
    ),
    template!(
        LowStock, "LOW_STOCK", LowStockAlert,
        "Low Stock Alert",
        "{product_name} is running low. Only {stock} unit(s) left.",
        Some("/vendor/products/{product_ref}")
    ),
    template!(
        OutOfStock, "OUT_OF_STOCK", OutOfStock,
        "Out of Stock",
        "{product_name} is out of stock. Restock it to keep selling.",
        Some("/vendor/products/{product_ref}")
    ),
    template!(
        CouponUsage, "COUPON_USAGE", CouponUsageAlert,
        "Coupon Usage Alert",
        "Coupon {code} has been used {usage_count} of {usage_limit} times ({usage_percent}%).",
        Some("/vendor/coupons")
    ),
    template!(
        CouponExpiring, "COUPON_EXPIRING", CouponExpiring,
        "Coupon Expiring Soon",
        "Coupon {code} expires on {expires_at}.",
        Some("/vendor/coupons")
    ),
    template!(
        ProductApproved, "PRODUCT_APPROVED", ProductStatusChange,
        "Product Approved",
        "Your product {product_name} has been approved and is now live.",
        Some("/vendor/products/{product_ref}")
    ),
    template!(
        ProductRejected, "PRODUCT_REJECTED", ProductStatusChange,
        "Product Rejected",
        "Your product {product_name} was not approved. Reason: {reason}.",
        Some("/vendor/products/{product_ref}")
    ),
    template!(
        AgentOrderAssigned, "AGENT_ORDER_ASSIGNED", AgentAssignment,
        "New Order Assigned",
        "Order #{order_id} for {customer_name} has been assigned to you. Total: {amount}.",
        Some("/agent/orders/{order_ref}")
    ),
    template!(
        AgentOrderUpdate, "AGENT_ORDER_UPDATE", AgentAssignment,
        "Order Update",
        "Order #{order_id} for {customer_name} is now {status}.",
        Some("/agent/orders/{order_ref}")
    ),
    template!(
        AdminHighValueOrder, "ADMIN_HIGH_VALUE_ORDER", AdminAlert,
        "High Value Order",
        "Order #{order_id} worth {amount} was placed by {customer_name}.",
        Some("/admin/orders/{order_ref}")
    ),
    template!(
        AdminPayoutRequest, "ADMIN_PAYOUT_REQUEST", AdminAlert,
        "Payout Request",
        "{vendor_name} requested a payout of {amount}.",
        Some("/admin/payouts")
    ),
    template!(
        AdminRefundRequest, "ADMIN_REFUND_REQUEST", AdminAlert,
        "Refund Request",
        "{customer_name} requested a refund of {amount} for order #{order_id}.",
        Some("/admin/refunds")
    ),
    template!(
        AdminNewVendor, "ADMIN_NEW_VENDOR", AdminAlert,
        "New Vendor Registration",
        "{vendor_name} has registered as a vendor and is awaiting verification.",
        Some("/admin/vendors")
    ),
    template!(
        AdminProductPending, "ADMIN_PRODUCT_PENDING", AdminAlert,
        "Product Pending Review",
        "{vendor_name} submitted {product_name} for review.",
        Some("/admin/products")
    ),
    template!(
        SystemTest, "SYSTEM_TEST", System,
        "Test Notification",
        "{message}",
        None
    ),
];

fn registry() -> &'static HashMap<TemplateKey, &'static TemplateDef> {
    static REGISTRY: OnceLock<HashMap<TemplateKey, &'static TemplateDef>> = OnceLock::new();
    REGISTRY.get_or_init(|| TEMPLATES.iter().map(|t| (t.key, t)).collect())
}

pub fn definition(key: TemplateKey) -> &'static TemplateDef {
    // Every key has exactly one row in TEMPLATES.
    registry()[&key]
}

// ============================================================================
// Template data
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderData {
    pub order_id: String,
    pub customer_name: Option<String>,
    pub total_amount: Option<f64>,
    pub status: Option<String>,
    pub reason: Option<String>,
    pub item_count: Option<i64>,
    pub payment_reference: Option<String>,
    pub earnings: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutData {
    pub payout_id: String,
    pub vendor_name: Option<String>,
    pub amount: Option<f64>,
    pub reference: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RefundData {
    pub return_id: String,
    pub order_id: Option<String>,
    pub customer_name: Option<String>,
    pub amount: Option<f64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StockData {
    pub product_id: String,
    pub product_name: Option<String>,
    pub stock: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CouponData {
    pub code: Option<String>,
    pub usage_count: i64,
    pub usage_limit: Option<i64>,
    pub expires_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductData {
    pub product_id: String,
    pub product_name: Option<String>,
    pub vendor_name: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorData {
    pub vendor_id: String,
    pub vendor_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemData {
    pub message: String,
}

impl Default for SystemData {
    fn default() -> Self {
        Self {
            message: "Notifications are working.".to_string(),
        }
    }
}

type Substitutions = Vec<(&'static str, String)>;

fn or_default(value: &Option<String>, fallback: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

fn money(value: Option<f64>) -> String {
    value
        .map(format_currency)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

impl OrderData {
    fn substitutions(&self) -> Substitutions {
        vec![
            ("order_id", short_id(&self.order_id)),
            ("order_ref", self.order_id.clone()),
            ("customer_name", or_default(&self.customer_name, "Customer")),
            ("amount", money(self.total_amount)),
            (
                "status",
                self.status
                    .as_deref()
                    .map(humanize_status)
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            ),
            ("reason", or_default(&self.reason, NO_REASON)),
            ("item_count", self.item_count.unwrap_or(0).to_string()),
            ("reference", or_default(&self.payment_reference, NOT_AVAILABLE)),
            ("earnings", money(self.earnings)),
        ]
    }
}

impl PayoutData {
    fn substitutions(&self) -> Substitutions {
        vec![
            ("payout_ref", self.payout_id.clone()),
            ("vendor_name", or_default(&self.vendor_name, "A vendor")),
            ("amount", money(self.amount)),
            ("reference", or_default(&self.reference, NOT_AVAILABLE)),
            ("reason", or_default(&self.reason, NO_REASON)),
        ]
    }
}

impl RefundData {
    fn substitutions(&self) -> Substitutions {
        let order_id = self.order_id.clone().unwrap_or_default();
        vec![
            ("return_ref", self.return_id.clone()),
            (
                "order_id",
                if order_id.is_empty() {
                    NOT_AVAILABLE.to_string()
                } else {
                    short_id(&order_id)
                },
            ),
            ("order_ref", order_id),
            ("customer_name", or_default(&self.customer_name, "A customer")),
            ("amount", money(self.amount)),
            ("reason", or_default(&self.reason, NO_REASON)),
        ]
    }
}

impl StockData {
    fn substitutions(&self) -> Substitutions {
        vec![
            ("product_ref", self.product_id.clone()),
            ("product_name", or_default(&self.product_name, UNKNOWN_PRODUCT)),
            ("stock", self.stock.max(0).to_string()),
        ]
    }
}

impl CouponData {
    fn substitutions(&self) -> Substitutions {
        let usage_percent = match self.usage_limit {
            Some(limit) if limit > 0 => {
                (i128::from(self.usage_count) * 100 / i128::from(limit)).to_string()
            }
            _ => NOT_AVAILABLE.to_string(),
        };
        vec![
            ("code", or_default(&self.code, NOT_AVAILABLE)),
            ("usage_count", self.usage_count.to_string()),
            (
                "usage_limit",
                self.usage_limit
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            ),
            ("usage_percent", usage_percent),
            (
                "expires_at",
                self.expires_at
                    .map(|d| d.format("%b %-d, %Y").to_string())
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            ),
        ]
    }
}

impl ProductData {
    fn substitutions(&self) -> Substitutions {
        vec![
            ("product_ref", self.product_id.clone()),
            ("product_name", or_default(&self.product_name, UNKNOWN_PRODUCT)),
            ("vendor_name", or_default(&self.vendor_name, "A vendor")),
            ("reason", or_default(&self.reason, NO_REASON)),
        ]
    }
}

impl VendorData {
    fn substitutions(&self) -> Substitutions {
        vec![
            ("vendor_ref", self.vendor_id.clone()),
            ("vendor_name", or_default(&self.vendor_name, "A new vendor")),
        ]
    }
}

impl SystemData {
    fn substitutions(&self) -> Substitutions {
        vec![("message", self.message.clone())]
    }
}

/// Typed input for every template. The variant selects the template.
#[derive(Debug, Clone)]
pub enum TemplateData {
    OrderConfirmation(OrderData),
    OrderStatusChange(OrderData),
    OrderCancelled(OrderData),
    NewOrderVendor(OrderData),
    PaymentSuccess(OrderData),
    PaymentFailed(OrderData),
    PayoutRequested(PayoutData),
    PayoutProcessed(PayoutData),
    PayoutFailed(PayoutData),
    RefundRequested(RefundData),
    RefundRequestedVendor(RefundData),
    RefundApproved(RefundData),
    RefundRejected(RefundData),
    RefundProcessed(RefundData),
    LowStock(StockData),
    OutOfStock(StockData),
    CouponUsage(CouponData),
    CouponExpiring(CouponData),
    ProductApproved(ProductData),
    ProductRejected(ProductData),
    AgentOrderAssigned(OrderData),
    AgentOrderUpdate(OrderData),
    AdminHighValueOrder(OrderData),
    AdminPayoutRequest(PayoutData),
    AdminRefundRequest(RefundData),
    AdminNewVendor(VendorData),
    AdminProductPending(ProductData),
    SystemTest(SystemData),
}

impl TemplateData {
    pub fn key(&self) -> TemplateKey {
        match self {
            TemplateData::OrderConfirmation(_) => TemplateKey::OrderConfirmation,
            TemplateData::OrderStatusChange(_) => TemplateKey::OrderStatusChange,
            TemplateData::OrderCancelled(_) => TemplateKey::OrderCancelled,
            TemplateData::NewOrderVendor(_) => TemplateKey::NewOrderVendor,
            TemplateData::PaymentSuccess(_) => TemplateKey::PaymentSuccess,
            TemplateData::PaymentFailed(_) => TemplateKey::PaymentFailed,
            TemplateData::PayoutRequested(_) => TemplateKey::PayoutRequested,
            TemplateData::PayoutProcessed(_) => TemplateKey::PayoutProcessed,
            TemplateData::PayoutFailed(_) => TemplateKey::PayoutFailed,
            TemplateData::RefundRequested(_) => TemplateKey::RefundRequested,
            TemplateData::RefundRequestedVendor(_) => TemplateKey::RefundRequestedVendor,
            TemplateData::RefundApproved(_) => TemplateKey::RefundApproved,
            TemplateData::RefundRejected(_) => TemplateKey::RefundRejected,
            TemplateData::RefundProcessed(_) => TemplateKey::RefundProcessed,
            TemplateData::LowStock(_) => TemplateKey::LowStock,
            TemplateData::OutOfStock(_) => TemplateKey::OutOfStock,
            TemplateData::CouponUsage(_) => TemplateKey::CouponUsage,
            TemplateData::CouponExpiring(_) => TemplateKey::CouponExpiring,
            TemplateData::ProductApproved(_) => TemplateKey::ProductApproved,
            TemplateData::ProductRejected(_) => TemplateKey::ProductRejected,
            TemplateData::AgentOrderAssigned(_) => TemplateKey::AgentOrderAssigned,
            TemplateData::AgentOrderUpdate(_) => TemplateKey::AgentOrderUpdate,
            TemplateData::AdminHighValueOrder(_) => TemplateKey::AdminHighValueOrder,
            TemplateData::AdminPayoutRequest(_) => TemplateKey::AdminPayoutRequest,
            TemplateData::AdminRefundRequest(_) => TemplateKey::AdminRefundRequest,
            TemplateData::AdminNewVendor(_) => TemplateKey::AdminNewVendor,
            TemplateData::AdminProductPending(_) => TemplateKey::AdminProductPending,
            TemplateData::SystemTest(_) => TemplateKey::SystemTest,
        }
    }

    fn substitutions(&self) -> Substitutions {
        match self {
            TemplateData::OrderConfirmation(d)
            | TemplateData::OrderStatusChange(d)
            | TemplateData::OrderCancelled(d)
            | TemplateData::NewOrderVendor(d)
            | TemplateData::PaymentSuccess(d)
            | TemplateData::PaymentFailed(d)
            | TemplateData::AgentOrderAssigned(d)
            | TemplateData::AgentOrderUpdate(d)
            | TemplateData::AdminHighValueOrder(d) => d.substitutions(),
            TemplateData::PayoutRequested(d)
            | TemplateData::PayoutProcessed(d)
            | TemplateData::PayoutFailed(d)
            | TemplateData::AdminPayoutRequest(d) => d.substitutions(),
            TemplateData::RefundRequested(d)
            | TemplateData::RefundRequestedVendor(d)
            | TemplateData::RefundApproved(d)
            | TemplateData::RefundRejected(d)
            | TemplateData::RefundProcessed(d)
            | TemplateData::AdminRefundRequest(d) => d.substitutions(),
            TemplateData::LowStock(d) | TemplateData::OutOfStock(d) => d.substitutions(),
            TemplateData::CouponUsage(d) | TemplateData::CouponExpiring(d) => d.substitutions(),
            TemplateData::ProductApproved(d)
            | TemplateData::ProductRejected(d)
            | TemplateData::AdminProductPending(d) => d.substitutions(),
            TemplateData::AdminNewVendor(d) => d.substitutions(),
            TemplateData::SystemTest(d) => d.substitutions(),
        }
    }

    /// Build typed data from a key and a JSON object. Missing fields take
    /// their defaults; a field of the wrong JSON type is rejected.
    pub fn from_value(key: TemplateKey, value: &serde_json::Value) -> Result<Self, TemplateError> {
        fn de<T: DeserializeOwned + Default>(
            key: TemplateKey,
            value: &serde_json::Value,
        ) -> Result<T, TemplateError> {
            if value.is_null() {
                return Ok(T::default());
            }
            serde_json::from_value(value.clone()).map_err(|e| TemplateError::InvalidData {
                key: key.as_str().to_string(),
                reason: e.to_string(),
            })
        }

        Ok(match key {
            TemplateKey::OrderConfirmation => TemplateData::OrderConfirmation(de(key, value)?),
            TemplateKey::OrderStatusChange => TemplateData::OrderStatusChange(de(key, value)?),
            TemplateKey::OrderCancelled => TemplateData::OrderCancelled(de(key, value)?),
            TemplateKey::NewOrderVendor => TemplateData::NewOrderVendor(de(key, value)?),
            TemplateKey::PaymentSuccess => TemplateData::PaymentSuccess(de(key, value)?),
            TemplateKey::PaymentFailed => TemplateData::PaymentFailed(de(key, value)?),
            TemplateKey::PayoutRequested => TemplateData::PayoutRequested(de(key, value)?),
            TemplateKey::PayoutProcessed => TemplateData::PayoutProcessed(de(key, value)?),
            TemplateKey::PayoutFailed => TemplateData::PayoutFailed(de(key, value)?),
            TemplateKey::RefundRequested => TemplateData::RefundRequested(de(key, value)?),
            TemplateKey::RefundRequestedVendor => {
                TemplateData::RefundRequestedVendor(de(key, value)?)
            }
            TemplateKey::RefundApproved => TemplateData::RefundApproved(de(key, value)?),
            TemplateKey::RefundRejected => TemplateData::RefundRejected(de(key, value)?),
            TemplateKey::RefundProcessed => TemplateData::RefundProcessed(de(key, value)?),
            TemplateKey::LowStock => TemplateData::LowStock(de(key, value)?),
            TemplateKey::OutOfStock => TemplateData::OutOfStock(de(key, value)?),
            TemplateKey::CouponUsage => TemplateData::CouponUsage(de(key, value)?),
            TemplateKey::CouponExpiring => TemplateData::CouponExpiring(de(key, value)?),
            TemplateKey::ProductApproved => TemplateData::ProductApproved(de(key, value)?),
            TemplateKey::ProductRejected => TemplateData::ProductRejected(de(key, value)?),
            TemplateKey::AgentOrderAssigned => TemplateData::AgentOrderAssigned(de(key, value)?),
            TemplateKey::AgentOrderUpdate => TemplateData::AgentOrderUpdate(de(key, value)?),
            TemplateKey::AdminHighValueOrder => TemplateData::AdminHighValueOrder(de(key, value)?),
            TemplateKey::AdminPayoutRequest => TemplateData::AdminPayoutRequest(de(key, value)?),
            TemplateKey::AdminRefundRequest => TemplateData::AdminRefundRequest(de(key, value)?),
            TemplateKey::AdminNewVendor => TemplateData::AdminNewVendor(de(key, value)?),
            TemplateKey::AdminProductPending => TemplateData::AdminProductPending(de(key, value)?),
            TemplateKey::SystemTest => TemplateData::SystemTest(de(key, value)?),
        })
    }
}

// ============================================================================
// Rendering
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Invalid data for template {key}: {reason}")]
    InvalidData { key: String, reason: String },
}

impl From<TemplateError> for NotificationError {
    fn from(e: TemplateError) -> Self {
        match e {
            TemplateError::NotFound(key) => NotificationError::TemplateNotFound(key),
            TemplateError::InvalidData { key, reason } => {
                NotificationError::InvalidTemplateData { key, reason }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rendered {
    pub key: TemplateKey,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub reference_url: Option<String>,
}

pub fn render(data: &TemplateData) -> Rendered {
    let def = definition(data.key());
    let values: HashMap<&str, String> = data.substitutions().into_iter().collect();

    Rendered {
        key: def.key,
        title: substitute(def.title, &values),
        message: substitute(def.message, &values),
        notification_type: def.notification_type,
        reference_url: def.reference_url.map(|url| substitute(url, &values)),
    }
}

/// Render by key name. Unknown keys fail with [`TemplateError::NotFound`].
pub fn render_value(key: &str, data: &serde_json::Value) -> Result<Rendered, TemplateError> {
    let key = TemplateKey::parse(key).ok_or_else(|| TemplateError::NotFound(key.to_string()))?;
    let data = TemplateData::from_value(key, data)?;
    Ok(render(&data))
}

/// Normalize placeholders in a message template.
/// Converts occurrences like `{{amount}}` into `{amount}`.
fn normalize_placeholders(msg: &str) -> String {
    let mut result = String::with_capacity(msg.len());
    let mut start = 0usize;

    while let Some(open_rel) = msg[start..].find("{{") {
        let open = start + open_rel;
        match msg[open + 2..].find("}}") {
            Some(close_rel) => {
                let close = open + 2 + close_rel;
                result.push_str(&msg[start..open]);
                result.push('{');
                result.push_str(&msg[open + 2..close]);
                result.push('}');
                start = close + 2;
            }
            None => break,
        }
    }

    result.push_str(&msg[start..]);
    result
}

/// Replace each `{name}` with its value in one pass. Placeholders without a
/// value are left exactly as written, and substituted values are never
/// rescanned.
pub fn substitute(pattern: &str, values: &HashMap<&str, String>) -> String {
    let pattern = normalize_placeholders(pattern);
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern.as_str();

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        if name.contains('{') {
            out.push('{');
            rest = after;
            continue;
        }
        match values.get(name) {
            Some(value) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

/// Naira with thousands separators and two decimals, e.g. `₦12,345.00`.
pub fn format_currency(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}₦{}.{}", sign, grouped, fraction)
}

/// Display form of an entity id: the first eight characters.
pub fn short_id(id: &str) -> String {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return NOT_AVAILABLE.to_string();
    }
    trimmed.chars().take(8).collect()
}

fn humanize_status(status: &str) -> String {
    status
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
