use super::{context, DispatchOutcome, DispatchResult, Dispatcher, Recipient, Refs, SkipReason};
use crate::db::MarketplaceRepository;
use crate::error::NotificationError;
use crate::services::templates::{
    OrderData, PayoutData, ProductData, RefundData, TemplateData, TemplateKey, VendorData,
};

impl Dispatcher {
    /// Same data to every admin as one batch.
    async fn notify_admins(&self, data: TemplateData, refs: Refs) -> DispatchResult {
        let admins = MarketplaceRepository::list_admins(&self.pool).await?;
        let recipients = admins
            .into_iter()
            .map(|admin| Recipient::new(admin.id, data.clone(), refs.clone()))
            .collect();
        self.notify_many(recipients).await
    }

    pub async fn send_high_value_order_alert(&self, order_id: &str) -> DispatchResult {
        let ctx = self.order_context(order_id).await?;
        let total = ctx.total_amount.unwrap_or(0.0);
        if total < self.config.high_value_order_threshold {
            return Ok(DispatchOutcome::skipped(SkipReason::BelowThreshold));
        }

        self.notify_admins(
            TemplateData::AdminHighValueOrder(OrderData::from_context(&ctx)),
            Refs::order(order_id),
        )
        .await
    }

    pub async fn send_payout_request_to_admins(&self, payout_id: &str) -> DispatchResult {
        let ctx = self.payout_context(payout_id).await?;
        self.notify_admins(
            TemplateData::AdminPayoutRequest(PayoutData::from_context(&ctx)),
            Refs::default(),
        )
        .await
    }

    pub async fn send_refund_request_to_admins(&self, return_id: &str) -> DispatchResult {
        let ctx = self.return_context(return_id).await?;
        self.notify_admins(
            TemplateData::AdminRefundRequest(RefundData::from_context(&ctx)),
            Refs::refund(&ctx.id, ctx.order_id.as_deref()),
        )
        .await
    }

    pub async fn send_new_vendor_alert(&self, vendor_id: &str) -> DispatchResult {
        let vendor = context(
            MarketplaceRepository::vendor_contact(&self.pool, vendor_id).await?,
            "vendor",
            vendor_id,
        )?;
        self.notify_admins(
            TemplateData::AdminNewVendor(VendorData {
                vendor_id: vendor.id,
                vendor_name: vendor.business_name,
            }),
            Refs::default(),
        )
        .await
    }

    pub async fn send_product_pending_review(&self, product_id: &str) -> DispatchResult {
        let ctx = self.product_context(product_id).await?;
        self.notify_admins(
            TemplateData::AdminProductPending(ProductData::from_context(&ctx)),
            Refs::default(),
        )
        .await
    }

    /// Render template `key` from raw JSON and send it to each listed user.
    /// Every user must exist; duplicates receive one copy.
    pub async fn send_templated(
        &self,
        user_ids: &[String],
        key: &str,
        data: &serde_json::Value,
    ) -> DispatchResult {
        let key = TemplateKey::parse(key)
            .ok_or_else(|| NotificationError::TemplateNotFound(key.to_string()))?;
        let data = TemplateData::from_value(key, data)?;

        let mut seen = std::collections::HashSet::new();
        let mut recipients = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            let user_id = user_id.trim();
            if !seen.insert(user_id.to_string()) {
                continue;
            }
            if MarketplaceRepository::find_user(&self.pool, user_id)
                .await?
                .is_none()
            {
                return Err(NotificationError::RecipientUnresolved(format!(
                    "user {}",
                    user_id
                )));
            }
            recipients.push(Recipient::new(user_id, data.clone(), Refs::default()));
        }

        self.notify_many(recipients).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::models::NotificationType;
    use crate::services::store::ListQuery;
    use crate::test_support::{
        insert_order, insert_payout, seed_marketplace, test_dispatcher, ORDER_ID,
    };

    #[tokio::test]
    async fn high_value_alert_respects_threshold() {
        let d = test_dispatcher().await;
        let pool = d.store().pool();
        seed_marketplace(pool).await;

        let outcome = d.send_high_value_order_alert(ORDER_ID).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::skipped(SkipReason::BelowThreshold));

        insert_order(pool, "big-order-1", "c1", None, 750_000.0).await;
        let outcome = d.send_high_value_order_alert("big-order-1").await.unwrap();
        assert_eq!(outcome.delivered_count(), 2);

        for admin in ["admin-1", "admin-2"] {
            let page = d.store().list(admin, ListQuery::default()).await.unwrap();
            assert_eq!(
                page.items[0].message,
                "Order #big-orde worth ₦750,000.00 was placed by Ada Obi."
            );
            assert_eq!(page.items[0].notification_type, NotificationType::AdminAlert);
        }
    }

    #[tokio::test]
    async fn payout_request_fans_out_to_admins_only() {
        let d = test_dispatcher().await;
        let pool = d.store().pool();
        seed_marketplace(pool).await;
        insert_payout(pool, "po1", "v1", 12_500.0).await;

        let outcome = d.send_payout_request_to_admins("po1").await.unwrap();
        assert_eq!(outcome.delivered_count(), 2);

        let page = d.store().list("admin-1", ListQuery::default()).await.unwrap();
        assert_eq!(page.items[0].message, "Acme Goods requested a payout of ₦12,500.00.");
        let vendor = d.store().list("vendor-1-user", ListQuery::default()).await.unwrap();
        assert_eq!(vendor.total_count, 0);
    }

    #[tokio::test]
    async fn no_admins_is_unresolved() {
        let d = test_dispatcher().await;
        let pool = d.store().pool();
        crate::test_support::insert_vendor(pool, "v1", "vendor-user", "Acme Goods").await;

        let outcome = d.send_new_vendor_alert("v1").await.unwrap();
        assert_eq!(outcome, DispatchOutcome::skipped(SkipReason::RecipientUnresolved));
    }

    #[tokio::test]
    async fn templated_send_validates_key_data_and_users() {
        let d = test_dispatcher().await;
        seed_marketplace(d.store().pool()).await;

        let err = d
            .send_templated(&["cust-user".into()], "NOPE", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::TemplateNotFound(_)));

        let err = d
            .send_templated(&["cust-user".into()], "LOW_STOCK", &json!({ "stock": "x" }))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::InvalidTemplateData { .. }));

        let err = d
            .send_templated(&["ghost".into()], "SYSTEM_TEST", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::RecipientUnresolved(_)));
    }

    #[tokio::test]
    async fn templated_send_deduplicates_recipients() {
        let d = test_dispatcher().await;
        seed_marketplace(d.store().pool()).await;

        let users = vec!["cust-user".to_string(), "agent-user".into(), "cust-user".into()];
        let outcome = d
            .send_templated(&users, "system_test", &json!({ "message": "Maintenance at noon" }))
            .await
            .unwrap();
        assert_eq!(outcome.delivered_count(), 2);

        let page = d.store().list("cust-user", ListQuery::default()).await.unwrap();
        assert_eq!(page.items[0].message, "Maintenance at noon");
    }
}
