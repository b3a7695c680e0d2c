use super::{context, DispatchResult, Dispatcher, Refs};
use crate::db::models::ProductContext;
use crate::db::MarketplaceRepository;
use crate::error::NotificationError;
use crate::services::templates::{ProductData, TemplateData};

impl ProductData {
    pub(crate) fn from_context(ctx: &ProductContext) -> Self {
        Self {
            product_id: ctx.id.clone(),
            product_name: ctx.name.clone(),
            vendor_name: ctx.vendor_name.clone(),
            reason: None,
        }
    }
}

impl Dispatcher {
    pub(crate) async fn product_context(
        &self,
        product_id: &str,
    ) -> Result<ProductContext, NotificationError> {
        context(
            MarketplaceRepository::product_context(&self.pool, product_id).await?,
            "product",
            product_id,
        )
    }

    pub async fn send_product_approved(&self, product_id: &str) -> DispatchResult {
        let ctx = self.product_context(product_id).await?;
        self.notify_user(
            ctx.vendor_user_id.as_deref(),
            TemplateData::ProductApproved(ProductData::from_context(&ctx)),
            Refs::default(),
        )
        .await
    }

    pub async fn send_product_rejected(&self, product_id: &str, reason: Option<&str>) -> DispatchResult {
        let ctx = self.product_context(product_id).await?;
        let data = ProductData {
            reason: reason.map(str::to_string),
            ..ProductData::from_context(&ctx)
        };
        self.notify_user(
            ctx.vendor_user_id.as_deref(),
            TemplateData::ProductRejected(data),
            Refs::default(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::models::NotificationType;
    use crate::services::store::ListQuery;
    use crate::test_support::{insert_product, insert_vendor, test_dispatcher};

    #[tokio::test]
    async fn approval_and_rejection_reach_the_vendor() {
        let d = test_dispatcher().await;
        let pool = d.store().pool();
        insert_vendor(pool, "v1", "vendor-user", "Acme Goods").await;
        insert_product(pool, "p1", "v1", "Red Kettle", 5).await;

        d.send_product_approved("p1").await.unwrap();
        d.send_product_rejected("p1", Some("Blurry photos")).await.unwrap();

        let page = d.store().list("vendor-user", ListQuery::default()).await.unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(
            page.items[0].message,
            "Your product Red Kettle was not approved. Reason: Blurry photos."
        );
        assert_eq!(
            page.items[1].message,
            "Your product Red Kettle has been approved and is now live."
        );
        assert_eq!(page.items[0].notification_type, NotificationType::ProductStatusChange);
    }
}
