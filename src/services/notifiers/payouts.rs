use super::{context, DispatchResult, Dispatcher, Refs};
use crate::db::models::PayoutContext;
use crate::db::MarketplaceRepository;
use crate::error::NotificationError;
use crate::services::templates::{PayoutData, TemplateData};

impl PayoutData {
    pub(crate) fn from_context(ctx: &PayoutContext) -> Self {
        Self {
            payout_id: ctx.id.clone(),
            vendor_name: ctx.vendor_name.clone(),
            amount: ctx.amount,
            reference: ctx.reference.clone(),
            reason: None,
        }
    }
}

impl Dispatcher {
    pub(crate) async fn payout_context(
        &self,
        payout_id: &str,
    ) -> Result<PayoutContext, NotificationError> {
        context(
            MarketplaceRepository::payout_context(&self.pool, payout_id).await?,
            "payout",
            payout_id,
        )
    }

    pub async fn send_payout_requested(&self, payout_id: &str) -> DispatchResult {
        let ctx = self.payout_context(payout_id).await?;
        self.notify_user(
            ctx.vendor_user_id.as_deref(),
            TemplateData::PayoutRequested(PayoutData::from_context(&ctx)),
            Refs::default(),
        )
        .await
    }

    pub async fn send_payout_processed(&self, payout_id: &str) -> DispatchResult {
        let ctx = self.payout_context(payout_id).await?;
        self.notify_user(
            ctx.vendor_user_id.as_deref(),
            TemplateData::PayoutProcessed(PayoutData::from_context(&ctx)),
            Refs::default(),
        )
        .await
    }

    pub async fn send_payout_failed(&self, payout_id: &str, reason: Option<&str>) -> DispatchResult {
        let ctx = self.payout_context(payout_id).await?;
        let data = PayoutData {
            reason: reason.map(str::to_string),
            ..PayoutData::from_context(&ctx)
        };
        self.notify_user(
            ctx.vendor_user_id.as_deref(),
            TemplateData::PayoutFailed(data),
            Refs::default(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::{DispatchOutcome, SkipReason};
    use crate::services::store::ListQuery;
    use crate::test_support::{insert_payout, insert_vendor, test_dispatcher};

    #[tokio::test]
    async fn processed_payout_goes_to_vendor_user() {
        let d = test_dispatcher().await;
        let pool = d.store().pool();
        insert_vendor(pool, "v1", "vendor-user", "Acme Goods").await;
        insert_payout(pool, "po1", "v1", 25000.0).await;

        d.send_payout_processed("po1").await.unwrap();

        let page = d.store().list("vendor-user", ListQuery::default()).await.unwrap();
        assert_eq!(
            page.items[0].message,
            "Your payout of ₦25,000.00 has been processed. Reference: PO-po1."
        );
        assert_eq!(page.items[0].reference_url.as_deref(), Some("/vendor/payouts"));
    }

    #[tokio::test]
    async fn failed_payout_reason_defaults() {
        let d = test_dispatcher().await;
        let pool = d.store().pool();
        insert_vendor(pool, "v1", "vendor-user", "Acme Goods").await;
        insert_payout(pool, "po1", "v1", 100.0).await;

        d.send_payout_failed("po1", Some("  ")).await.unwrap();

        let page = d.store().list("vendor-user", ListQuery::default()).await.unwrap();
        assert_eq!(
            page.items[0].message,
            "Your payout of ₦100.00 failed: No reason provided."
        );
    }

    #[tokio::test]
    async fn vendor_without_user_is_unresolved() {
        let d = test_dispatcher().await;
        let pool = d.store().pool();
        sqlx::query("INSERT INTO vendors (id, business_name) VALUES ('v9', 'Orphan Ltd')")
            .execute(pool)
            .await
            .unwrap();
        insert_payout(pool, "po1", "v9", 100.0).await;

        let outcome = d.send_payout_requested("po1").await.unwrap();
        assert_eq!(outcome, DispatchOutcome::skipped(SkipReason::RecipientUnresolved));
    }
}
