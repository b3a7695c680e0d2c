use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Marketplace Read Repository
// ============================================================================

/// Lookups against marketplace-owned tables. Nothing here writes.
pub struct MarketplaceRepository;

impl MarketplaceRepository {
    pub async fn find_user(pool: &SqlitePool, id: &str) -> AppResult<Option<MarketplaceUser>> {
        sqlx::query_as::<_, MarketplaceUser>(
            "SELECT id, email, full_name, role FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn list_admins(pool: &SqlitePool) -> AppResult<Vec<MarketplaceUser>> {
        sqlx::query_as::<_, MarketplaceUser>(
            "SELECT id, email, full_name, role FROM users WHERE lower(role) = 'admin' ORDER BY id",
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn order_context(
        pool: &SqlitePool,
        order_id: &str,
    ) -> AppResult<Option<OrderContext>> {
        sqlx::query_as::<_, OrderContext>(
            r#"
            SELECT
                o.id AS id,
                o.status AS status,
                o.total_amount AS total_amount,
                o.payment_reference AS payment_reference,
                c.user_id AS customer_user_id,
                COALESCE(c.full_name, cu.full_name) AS customer_name,
                a.user_id AS agent_user_id,
                a.full_name AS agent_name
            FROM orders o
            LEFT JOIN customers c ON c.id = o.customer_id
            LEFT JOIN users cu ON cu.id = c.user_id
            LEFT JOIN agents a ON a.id = o.agent_id
            WHERE o.id = ?
            "#,
        )
        .bind(order_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn order_item_count(pool: &SqlitePool, order_id: &str) -> AppResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT CAST(COALESCE(SUM(quantity), 0) AS INTEGER) FROM order_items WHERE order_id = ?",
        )
        .bind(order_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(count.0)
    }

    /// Per-vendor item count and earnings for an order.
    pub async fn vendor_shares(
        pool: &SqlitePool,
        order_id: &str,
    ) -> AppResult<Vec<VendorOrderShare>> {
        sqlx::query_as::<_, VendorOrderShare>(
            r#"
            SELECT
                oi.vendor_id AS vendor_id,
                v.user_id AS vendor_user_id,
                v.business_name AS business_name,
                CAST(COALESCE(SUM(oi.quantity), 0) AS INTEGER) AS item_count,
                CAST(COALESCE(SUM(oi.quantity * oi.unit_price), 0) AS REAL) AS earnings
            FROM order_items oi
            LEFT JOIN vendors v ON v.id = oi.vendor_id
            WHERE oi.order_id = ? AND oi.vendor_id IS NOT NULL
            GROUP BY oi.vendor_id, v.user_id, v.business_name
            ORDER BY oi.vendor_id
            "#,
        )
        .bind(order_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn vendor_contact(
        pool: &SqlitePool,
        vendor_id: &str,
    ) -> AppResult<Option<VendorContact>> {
        sqlx::query_as::<_, VendorContact>(
            r#"
            SELECT v.id AS id, v.user_id AS user_id, v.business_name AS business_name, u.email AS email
            FROM vendors v
            LEFT JOIN users u ON u.id = v.user_id
            WHERE v.id = ?
            "#,
        )
        .bind(vendor_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn product_context(
        pool: &SqlitePool,
        product_id: &str,
    ) -> AppResult<Option<ProductContext>> {
        sqlx::query_as::<_, ProductContext>(
            r#"
            SELECT
                p.id AS id,
                p.name AS name,
                p.stock_quantity AS stock_quantity,
                p.status AS status,
                p.vendor_id AS vendor_id,
                v.user_id AS vendor_user_id,
                v.business_name AS vendor_name
            FROM products p
            LEFT JOIN vendors v ON v.id = p.vendor_id
            WHERE p.id = ?
            "#,
        )
        .bind(product_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Products at or below `threshold` units.
    pub async fn low_stock_products(
        pool: &SqlitePool,
        threshold: i64,
    ) -> AppResult<Vec<ProductContext>> {
        sqlx::query_as::<_, ProductContext>(
            r#"
            SELECT
                p.id AS id,
                p.name AS name,
                p.stock_quantity AS stock_quantity,
                p.status AS status,
                p.vendor_id AS vendor_id,
                v.user_id AS vendor_user_id,
                v.business_name AS vendor_name
            FROM products p
            LEFT JOIN vendors v ON v.id = p.vendor_id
            WHERE p.stock_quantity <= ?
            ORDER BY p.stock_quantity ASC, p.id
            "#,
        )
        .bind(threshold)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn payout_context(
        pool: &SqlitePool,
        payout_id: &str,
    ) -> AppResult<Option<PayoutContext>> {
        sqlx::query_as::<_, PayoutContext>(
            r#"
            SELECT
                p.id AS id,
                p.amount AS amount,
                p.status AS status,
                p.reference AS reference,
                p.vendor_id AS vendor_id,
                v.user_id AS vendor_user_id,
                v.business_name AS vendor_name
            FROM payouts p
            LEFT JOIN vendors v ON v.id = p.vendor_id
            WHERE p.id = ?
            "#,
        )
        .bind(payout_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn return_context(
        pool: &SqlitePool,
        return_id: &str,
    ) -> AppResult<Option<ReturnContext>> {
        sqlx::query_as::<_, ReturnContext>(
            r#"
            SELECT
                r.id AS id,
                r.order_id AS order_id,
                r.amount AS amount,
                r.reason AS reason,
                r.status AS status,
                c.user_id AS customer_user_id,
                COALESCE(c.full_name, cu.full_name) AS customer_name
            FROM returns r
            LEFT JOIN customers c ON c.id = r.customer_id
            LEFT JOIN users cu ON cu.id = c.user_id
            WHERE r.id = ?
            "#,
        )
        .bind(return_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn coupon_context(
        pool: &SqlitePool,
        coupon_id: &str,
    ) -> AppResult<Option<CouponContext>> {
        sqlx::query_as::<_, CouponContext>(
            r#"
            SELECT
                c.id AS id,
                c.code AS code,
                c.usage_count AS usage_count,
                c.usage_limit AS usage_limit,
                c.expires_at AS expires_at,
                c.vendor_id AS vendor_id,
                v.user_id AS vendor_user_id,
                v.business_name AS vendor_name
            FROM coupons c
            LEFT JOIN vendors v ON v.id = c.vendor_id
            WHERE c.id = ?
            "#,
        )
        .bind(coupon_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Active coupons that crossed the usage threshold or expire inside
    /// `(now, expiry_cutoff]`.
    pub async fn coupons_needing_attention(
        pool: &SqlitePool,
        usage_percent: i64,
        now: NaiveDateTime,
        expiry_cutoff: NaiveDateTime,
    ) -> AppResult<Vec<CouponContext>> {
        sqlx::query_as::<_, CouponContext>(
            r#"
            SELECT
                c.id AS id,
                c.code AS code,
                c.usage_count AS usage_count,
                c.usage_limit AS usage_limit,
                c.expires_at AS expires_at,
                c.vendor_id AS vendor_id,
                v.user_id AS vendor_user_id,
                v.business_name AS vendor_name
            FROM coupons c
            LEFT JOIN vendors v ON v.id = c.vendor_id
            WHERE c.is_active = 1
              AND (
                (c.usage_limit IS NOT NULL AND c.usage_limit > 0
                    AND c.usage_count * 100 >= c.usage_limit * ?)
                OR (c.expires_at IS NOT NULL AND c.expires_at > ? AND c.expires_at <= ?)
              )
            ORDER BY c.id
            "#,
        )
        .bind(usage_percent)
        .bind(now)
        .bind(expiry_cutoff)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }
}
