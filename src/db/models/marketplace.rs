//! Read-only projections of marketplace rows used to resolve recipients and
//! template context.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MarketplaceUser {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: String,
}

impl MarketplaceUser {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OrderContext {
    pub id: String,
    pub status: String,
    pub total_amount: Option<f64>,
    pub payment_reference: Option<String>,
    pub customer_user_id: Option<String>,
    pub customer_name: Option<String>,
    pub agent_user_id: Option<String>,
    pub agent_name: Option<String>,
}

/// One vendor's slice of an order.
#[derive(Debug, Clone, FromRow)]
pub struct VendorOrderShare {
    pub vendor_id: String,
    pub vendor_user_id: Option<String>,
    pub business_name: Option<String>,
    pub item_count: i64,
    pub earnings: f64,
}

#[derive(Debug, Clone, FromRow)]
pub struct ProductContext {
    pub id: String,
    pub name: Option<String>,
    pub stock_quantity: i64,
    pub status: String,
    pub vendor_id: Option<String>,
    pub vendor_user_id: Option<String>,
    pub vendor_name: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PayoutContext {
    pub id: String,
    pub amount: Option<f64>,
    pub status: String,
    pub reference: Option<String>,
    pub vendor_id: Option<String>,
    pub vendor_user_id: Option<String>,
    pub vendor_name: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ReturnContext {
    pub id: String,
    pub order_id: Option<String>,
    pub amount: Option<f64>,
    pub reason: Option<String>,
    pub status: String,
    pub customer_user_id: Option<String>,
    pub customer_name: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CouponContext {
    pub id: String,
    pub code: String,
    pub usage_count: i64,
    pub usage_limit: Option<i64>,
    pub expires_at: Option<NaiveDateTime>,
    pub vendor_id: Option<String>,
    pub vendor_user_id: Option<String>,
    pub vendor_name: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct VendorContact {
    pub id: String,
    pub user_id: Option<String>,
    pub business_name: Option<String>,
    pub email: Option<String>,
}
