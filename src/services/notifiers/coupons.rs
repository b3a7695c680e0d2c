use chrono::{Duration, NaiveDateTime, Utc};

use super::{context, DispatchResult, Dispatcher, Refs, SweepReport};
use crate::config::MAX_COUPON_EXPIRY_WINDOW_DAYS;
use crate::db::models::CouponContext;
use crate::db::MarketplaceRepository;
use crate::error::NotificationError;
use crate::services::templates::{CouponData, TemplateData};

impl CouponData {
    fn from_context(ctx: &CouponContext) -> Self {
        Self {
            code: Some(ctx.code.clone()),
            usage_count: ctx.usage_count,
            usage_limit: ctx.usage_limit,
            expires_at: ctx.expires_at,
        }
    }
}

fn usage_crossed(ctx: &CouponContext, percent: i64) -> bool {
    matches!(
        ctx.usage_limit,
        Some(limit) if limit > 0
            && i128::from(ctx.usage_count) * 100 >= i128::from(limit) * i128::from(percent)
    )
}

fn expires_within(ctx: &CouponContext, now: NaiveDateTime, cutoff: NaiveDateTime) -> bool {
    matches!(ctx.expires_at, Some(at) if at > now && at <= cutoff)
}

impl Dispatcher {
    async fn coupon_context(&self, coupon_id: &str) -> Result<CouponContext, NotificationError> {
        context(
            MarketplaceRepository::coupon_context(&self.pool, coupon_id).await?,
            "coupon",
            coupon_id,
        )
    }

    pub async fn send_coupon_usage_alert(&self, coupon_id: &str) -> DispatchResult {
        let ctx = self.coupon_context(coupon_id).await?;
        self.coupon_usage(&ctx).await
    }

    pub async fn send_coupon_expiring(&self, coupon_id: &str) -> DispatchResult {
        let ctx = self.coupon_context(coupon_id).await?;
        self.coupon_expiring(&ctx).await
    }

    async fn coupon_usage(&self, ctx: &CouponContext) -> DispatchResult {
        self.notify_user(
            ctx.vendor_user_id.as_deref(),
            TemplateData::CouponUsage(CouponData::from_context(ctx)),
            Refs::default(),
        )
        .await
    }

    async fn coupon_expiring(&self, ctx: &CouponContext) -> DispatchResult {
        self.notify_user(
            ctx.vendor_user_id.as_deref(),
            TemplateData::CouponExpiring(CouponData::from_context(ctx)),
            Refs::default(),
        )
        .await
    }

    /// Scan active coupons for usage past the alert percentage and for
    /// expiry inside the window. A coupon matching both gets both alerts.
    pub async fn sweep_coupons(&self) -> Result<SweepReport, NotificationError> {
        let now = Utc::now().naive_utc();
        let window_days = self
            .sweeps
            .coupon_expiry_window_days
            .clamp(0, MAX_COUPON_EXPIRY_WINDOW_DAYS);
        let cutoff = Duration::try_days(window_days)
            .and_then(|window| now.checked_add_signed(window))
            .unwrap_or(now);
        let percent = self.sweeps.coupon_usage_alert_percent;

        let coupons =
            MarketplaceRepository::coupons_needing_attention(&self.pool, percent, now, cutoff)
                .await?;

        let mut report = SweepReport {
            scanned: coupons.len(),
            ..Default::default()
        };
        for coupon in &coupons {
            if usage_crossed(coupon, percent) {
                let result = self.coupon_usage(coupon).await;
                if let Err(e) = &result {
                    tracing::warn!(coupon_id = %coupon.id, "Coupon usage alert failed: {}", e);
                }
                report.record(&result);
            }
            if expires_within(coupon, now, cutoff) {
                let result = self.coupon_expiring(coupon).await;
                if let Err(e) = &result {
                    tracing::warn!(coupon_id = %coupon.id, "Coupon expiry alert failed: {}", e);
                }
                report.record(&result);
            }
        }

        tracing::info!(
            scanned = report.scanned,
            notified = report.notified,
            skipped = report.skipped,
            failed = report.failed,
            "Coupon sweep finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::config::Config;
    use crate::db::models::{CouponContext, NotificationType};
    use crate::services::notifiers::Dispatcher;
    use crate::services::push::PushService;
    use crate::services::store::ListQuery;
    use crate::test_support::{insert_coupon, insert_vendor, test_dispatcher, test_store};

    use super::usage_crossed;

    #[tokio::test]
    async fn usage_alert_reports_percentage() {
        let d = test_dispatcher().await;
        let pool = d.store().pool();
        insert_vendor(pool, "v1", "vendor-user", "Acme Goods").await;
        insert_coupon(pool, "k1", "v1", "SAVE20", 45, Some(50), None).await;

        d.send_coupon_usage_alert("k1").await.unwrap();

        let page = d.store().list("vendor-user", ListQuery::default()).await.unwrap();
        assert_eq!(
            page.items[0].message,
            "Coupon SAVE20 has been used 45 of 50 times (90%)."
        );
    }

    #[tokio::test]
    async fn sweep_picks_usage_and_expiry_independently() {
        let d = test_dispatcher().await;
        let pool = d.store().pool();
        let now = Utc::now().naive_utc();
        insert_vendor(pool, "v1", "vendor-user", "Acme Goods").await;
        // usage only
        insert_coupon(pool, "k1", "v1", "BUSY", 80, Some(100), None).await;
        // expiry only
        insert_coupon(pool, "k2", "v1", "SOON", 1, Some(100), Some(now + Duration::days(2))).await;
        // both
        insert_coupon(pool, "k3", "v1", "BOTH", 9, Some(10), Some(now + Duration::hours(5))).await;
        // neither: quiet and far from expiry
        insert_coupon(pool, "k4", "v1", "QUIET", 79, Some(100), Some(now + Duration::days(30))).await;
        // already expired
        insert_coupon(pool, "k5", "v1", "GONE", 0, None, Some(now - Duration::days(1))).await;

        let report = d.sweep_coupons().await.unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.notified, 4);
        assert_eq!(report.failed, 0);

        let page = d.store().list("vendor-user", ListQuery::default()).await.unwrap();
        let usage = page
            .items
            .iter()
            .filter(|n| n.notification_type == NotificationType::CouponUsageAlert)
            .count();
        let expiring = page
            .items
            .iter()
            .filter(|n| n.notification_type == NotificationType::CouponExpiring)
            .count();
        assert_eq!((usage, expiring), (2, 2));
    }

    #[test]
    fn usage_threshold_survives_extreme_counts() {
        let ctx = CouponContext {
            id: "k1".into(),
            code: "BIG".into(),
            usage_count: i64::MAX,
            usage_limit: Some(i64::MAX),
            expires_at: None,
            vendor_id: None,
            vendor_user_id: None,
            vendor_name: None,
        };
        assert!(usage_crossed(&ctx, 80));
        assert!(!usage_crossed(&CouponContext { usage_count: 1, ..ctx }, 80));
    }

    #[tokio::test]
    async fn oversized_expiry_window_is_capped() {
        let store = test_store().await;
        let push = PushService::new(store.pool().clone(), None, None, 4);
        let mut config = Config::default();
        config.sweeps.coupon_expiry_window_days = i64::MAX;
        let d = Dispatcher::new(store, push, config.dispatch, config.sweeps);

        let pool = d.store().pool();
        insert_vendor(pool, "v1", "vendor-user", "Acme Goods").await;
        let now = Utc::now().naive_utc();
        insert_coupon(pool, "k1", "v1", "LATER", 0, None, Some(now + Duration::days(3000))).await;
        insert_coupon(pool, "k2", "v1", "DISTANT", 0, None, Some(now + Duration::days(4000))).await;

        let report = d.sweep_coupons().await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.notified, 1);
    }
}
