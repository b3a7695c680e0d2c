use super::{DispatchResult, Dispatcher, Refs};
use crate::services::templates::{OrderData, TemplateData};

impl Dispatcher {
    pub async fn send_payment_success(&self, order_id: &str) -> DispatchResult {
        let ctx = self.order_context(order_id).await?;
        self.notify_user(
            ctx.customer_user_id.as_deref(),
            TemplateData::PaymentSuccess(OrderData::from_context(&ctx)),
            Refs::order(order_id),
        )
        .await
    }

    pub async fn send_payment_failed(&self, order_id: &str, reason: Option<&str>) -> DispatchResult {
        let ctx = self.order_context(order_id).await?;
        let data = OrderData {
            reason: reason.map(str::to_string),
            ..OrderData::from_context(&ctx)
        };
        self.notify_user(
            ctx.customer_user_id.as_deref(),
            TemplateData::PaymentFailed(data),
            Refs::order(order_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::models::NotificationType;
    use crate::services::store::ListQuery;
    use crate::test_support::{seed_marketplace, test_dispatcher, ORDER_ID};

    #[tokio::test]
    async fn success_carries_payment_reference() {
        let d = test_dispatcher().await;
        seed_marketplace(d.store().pool()).await;
        d.send_payment_success(ORDER_ID).await.unwrap();

        let page = d.store().list("cust-user", ListQuery::default()).await.unwrap();
        assert_eq!(page.items[0].notification_type, NotificationType::PaymentSuccess);
        assert_eq!(
            page.items[0].message,
            "We received your payment of ₦7,000.00 for order #ord-7f3a. Reference: PAY-ord-7f3a9c21-0001."
        );
    }

    #[tokio::test]
    async fn failure_includes_reason() {
        let d = test_dispatcher().await;
        seed_marketplace(d.store().pool()).await;
        d.send_payment_failed(ORDER_ID, Some("card declined"))
            .await
            .unwrap();

        let page = d.store().list("cust-user", ListQuery::default()).await.unwrap();
        assert_eq!(page.items[0].title, "Payment Failed");
        assert!(page.items[0].message.contains(": card declined."));
    }
}
