use super::{DispatchResult, Dispatcher, Refs};
use crate::services::templates::{OrderData, TemplateData};

impl Dispatcher {
    pub async fn send_agent_order_assigned(&self, order_id: &str) -> DispatchResult {
        let ctx = self.order_context(order_id).await?;
        self.notify_user(
            ctx.agent_user_id.as_deref(),
            TemplateData::AgentOrderAssigned(OrderData::from_context(&ctx)),
            Refs::order(order_id),
        )
        .await
    }

    pub async fn send_agent_order_update(&self, order_id: &str, status: &str) -> DispatchResult {
        let ctx = self.order_context(order_id).await?;
        let data = OrderData {
            status: Some(status.to_string()),
            ..OrderData::from_context(&ctx)
        };
        self.notify_user(
            ctx.agent_user_id.as_deref(),
            TemplateData::AgentOrderUpdate(data),
            Refs::order(order_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::{DispatchOutcome, SkipReason};
    use crate::services::store::ListQuery;
    use crate::test_support::{insert_order, seed_marketplace, test_dispatcher, ORDER_ID};

    #[tokio::test]
    async fn assignment_goes_to_agent_user() {
        let d = test_dispatcher().await;
        seed_marketplace(d.store().pool()).await;

        d.send_agent_order_assigned(ORDER_ID).await.unwrap();
        d.send_agent_order_update(ORDER_ID, "delivered").await.unwrap();

        let page = d.store().list("agent-user", ListQuery::default()).await.unwrap();
        assert_eq!(page.items[0].message, "Order #ord-7f3a for Ada Obi is now Delivered.");
        assert_eq!(
            page.items[1].message,
            "Order #ord-7f3a for Ada Obi has been assigned to you. Total: ₦7,000.00."
        );
        assert_eq!(
            page.items[1].reference_url.as_deref(),
            Some("/agent/orders/ord-7f3a9c21-0001")
        );
    }

    #[tokio::test]
    async fn order_without_agent_is_unresolved() {
        let d = test_dispatcher().await;
        let pool = d.store().pool();
        seed_marketplace(pool).await;
        insert_order(pool, "o2", "c1", None, 10.0).await;

        let outcome = d.send_agent_order_assigned("o2").await.unwrap();
        assert_eq!(outcome, DispatchOutcome::skipped(SkipReason::RecipientUnresolved));
    }
}
