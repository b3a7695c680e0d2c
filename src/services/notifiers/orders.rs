use super::{context, DispatchResult, Dispatcher, Recipient, Refs};
use crate::db::models::OrderContext;
use crate::db::MarketplaceRepository;
use crate::error::NotificationError;
use crate::services::templates::{OrderData, TemplateData};

impl OrderData {
    pub(crate) fn from_context(ctx: &OrderContext) -> Self {
        Self {
            order_id: ctx.id.clone(),
            customer_name: ctx.customer_name.clone(),
            total_amount: ctx.total_amount,
            status: Some(ctx.status.clone()),
            payment_reference: ctx.payment_reference.clone(),
            ..Default::default()
        }
    }
}

impl Dispatcher {
    pub(crate) async fn order_context(
        &self,
        order_id: &str,
    ) -> Result<OrderContext, NotificationError> {
        context(
            MarketplaceRepository::order_context(&self.pool, order_id).await?,
            "order",
            order_id,
        )
    }

    pub async fn send_order_confirmation(&self, order_id: &str) -> DispatchResult {
        let ctx = self.order_context(order_id).await?;
        let item_count = MarketplaceRepository::order_item_count(&self.pool, order_id).await?;

        let data = OrderData {
            item_count: Some(item_count),
            ..OrderData::from_context(&ctx)
        };
        self.notify_user(
            ctx.customer_user_id.as_deref(),
            TemplateData::OrderConfirmation(data),
            Refs::order(order_id),
        )
        .await
    }

    pub async fn send_order_status_change(&self, order_id: &str, status: &str) -> DispatchResult {
        let ctx = self.order_context(order_id).await?;

        let data = OrderData {
            status: Some(status.to_string()),
            ..OrderData::from_context(&ctx)
        };
        self.notify_user(
            ctx.customer_user_id.as_deref(),
            TemplateData::OrderStatusChange(data),
            Refs::order(order_id),
        )
        .await
    }

    pub async fn send_order_cancelled(&self, order_id: &str, reason: Option<&str>) -> DispatchResult {
        let ctx = self.order_context(order_id).await?;

        let data = OrderData {
            reason: reason.map(str::to_string),
            ..OrderData::from_context(&ctx)
        };
        self.notify_user(
            ctx.customer_user_id.as_deref(),
            TemplateData::OrderCancelled(data),
            Refs::order(order_id),
        )
        .await
    }

    /// One notification per vendor with items in the order, each carrying
    /// that vendor's item count and earnings.
    pub async fn send_new_order_to_vendors(&self, order_id: &str) -> DispatchResult {
        let ctx = self.order_context(order_id).await?;
        let shares = MarketplaceRepository::vendor_shares(&self.pool, order_id).await?;

        let mut recipients = Vec::with_capacity(shares.len());
        for share in shares {
            let Some(user_id) = share.vendor_user_id else {
                tracing::debug!(vendor_id = %share.vendor_id, order_id = %order_id, "Vendor has no user, skipping");
                continue;
            };
            let data = OrderData {
                item_count: Some(share.item_count),
                earnings: Some(share.earnings),
                ..OrderData::from_context(&ctx)
            };
            recipients.push(Recipient::new(
                user_id,
                TemplateData::NewOrderVendor(data),
                Refs::order(order_id),
            ));
        }

        self.notify_many(recipients).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::{DispatchOutcome, SkipReason};
    use crate::db::models::{Channel, NotificationType, UpdatePreference};
    use crate::error::NotificationError;
    use crate::services::preferences::PreferenceGate;
    use crate::services::store::{ListQuery, UnreadFilter};
    use crate::test_support::{seed_marketplace, test_dispatcher, ORDER_ID};

    #[tokio::test]
    async fn confirmation_goes_to_the_customer() {
        let d = test_dispatcher().await;
        seed_marketplace(d.store().pool()).await;

        let outcome = d.send_order_confirmation(ORDER_ID).await.unwrap();
        assert!(outcome.is_delivered());

        let page = d.store().list("cust-user", ListQuery::default()).await.unwrap();
        let n = &page.items[0];
        assert_eq!(n.title, "Order Confirmed");
        assert_eq!(
            n.message,
            "Your order #ord-7f3a has been placed successfully. Total: ₦7,000.00."
        );
        assert_eq!(n.order_id.as_deref(), Some(ORDER_ID));
        assert_eq!(n.reference_url.as_deref(), Some("/orders/ord-7f3a9c21-0001"));
    }

    #[tokio::test]
    async fn status_change_respects_disabled_preference() {
        let d = test_dispatcher().await;
        seed_marketplace(d.store().pool()).await;
        PreferenceGate::update(
            d.store().pool(),
            "cust-user",
            &[UpdatePreference {
                notification_type: NotificationType::OrderStatusChange,
                channel: Channel::InApp,
                enabled: false,
            }],
        )
        .await
        .unwrap();

        let outcome = d.send_order_status_change(ORDER_ID, "PROCESSING").await.unwrap();
        assert_eq!(outcome, DispatchOutcome::skipped(SkipReason::PreferenceDisabled));
        assert_eq!(
            d.store()
                .unread_count("cust-user", UnreadFilter::default())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn status_text_is_humanized() {
        let d = test_dispatcher().await;
        seed_marketplace(d.store().pool()).await;
        d.send_order_status_change(ORDER_ID, "out_for_delivery")
            .await
            .unwrap();

        let page = d.store().list("cust-user", ListQuery::default()).await.unwrap();
        assert_eq!(page.items[0].message, "Your order #ord-7f3a is now Out For Delivery.");
    }

    #[tokio::test]
    async fn new_order_fans_out_with_vendor_earnings() {
        let d = test_dispatcher().await;
        seed_marketplace(d.store().pool()).await;

        let outcome = d.send_new_order_to_vendors(ORDER_ID).await.unwrap();
        assert_eq!(outcome.delivered_count(), 2);

        let a = d.store().list("vendor-1-user", ListQuery::default()).await.unwrap();
        let b = d.store().list("vendor-2-user", ListQuery::default()).await.unwrap();
        assert_eq!(a.total_count, 1);
        assert_eq!(b.total_count, 1);
        assert!(a.items[0].message.contains("2 item(s)"));
        assert!(a.items[0].message.contains("Your earnings: ₦3,000.00"));
        assert!(b.items[0].message.contains("Your earnings: ₦4,000.00"));
        assert_eq!(a.items[0].notification_type, NotificationType::NewOrder);
    }

    #[tokio::test]
    async fn cancelled_without_reason_uses_placeholder() {
        let d = test_dispatcher().await;
        seed_marketplace(d.store().pool()).await;
        d.send_order_cancelled(ORDER_ID, None).await.unwrap();

        let page = d.store().list("cust-user", ListQuery::default()).await.unwrap();
        assert!(page.items[0].message.ends_with("Reason: No reason provided."));
    }

    #[tokio::test]
    async fn unknown_order_is_context_error() {
        let d = test_dispatcher().await;
        let err = d.send_order_confirmation("missing").await.unwrap_err();
        assert!(matches!(err, NotificationError::ContextNotFound(_)));
    }
}
