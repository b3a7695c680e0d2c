use super::{context, DispatchResult, Dispatcher, Recipient, Refs};
use crate::db::models::ReturnContext;
use crate::db::MarketplaceRepository;
use crate::error::NotificationError;
use crate::services::templates::{RefundData, TemplateData};

impl RefundData {
    pub(crate) fn from_context(ctx: &ReturnContext) -> Self {
        Self {
            return_id: ctx.id.clone(),
            order_id: ctx.order_id.clone(),
            customer_name: ctx.customer_name.clone(),
            amount: ctx.amount,
            reason: ctx.reason.clone(),
        }
    }
}

fn refs(ctx: &ReturnContext) -> Refs {
    Refs::refund(&ctx.id, ctx.order_id.as_deref())
}

impl Dispatcher {
    pub(crate) async fn return_context(
        &self,
        return_id: &str,
    ) -> Result<ReturnContext, NotificationError> {
        context(
            MarketplaceRepository::return_context(&self.pool, return_id).await?,
            "return",
            return_id,
        )
    }

    /// Acknowledge the request to the customer and tell every vendor with
    /// items in the refunded order. Written as one batch.
    pub async fn send_refund_requested(&self, return_id: &str) -> DispatchResult {
        let ctx = self.return_context(return_id).await?;
        let data = RefundData::from_context(&ctx);

        let mut recipients = Vec::new();
        if let Some(customer) = ctx.customer_user_id.as_deref() {
            recipients.push(Recipient::new(
                customer,
                TemplateData::RefundRequested(data.clone()),
                refs(&ctx),
            ));
        }

        if let Some(order_id) = ctx.order_id.as_deref() {
            let shares = MarketplaceRepository::vendor_shares(&self.pool, order_id).await?;
            recipients.extend(shares.into_iter().filter_map(|share| {
                share.vendor_user_id.map(|user_id| {
                    Recipient::new(
                        user_id,
                        TemplateData::RefundRequestedVendor(data.clone()),
                        refs(&ctx),
                    )
                })
            }));
        }

        self.notify_many(recipients).await
    }

    pub async fn send_refund_approved(&self, return_id: &str) -> DispatchResult {
        let ctx = self.return_context(return_id).await?;
        self.notify_user(
            ctx.customer_user_id.as_deref(),
            TemplateData::RefundApproved(RefundData::from_context(&ctx)),
            refs(&ctx),
        )
        .await
    }

    /// `reason` overrides the reason the customer gave when requesting.
    pub async fn send_refund_rejected(&self, return_id: &str, reason: Option<&str>) -> DispatchResult {
        let ctx = self.return_context(return_id).await?;
        let data = RefundData {
            reason: reason.map(str::to_string),
            ..RefundData::from_context(&ctx)
        };
        self.notify_user(
            ctx.customer_user_id.as_deref(),
            TemplateData::RefundRejected(data),
            refs(&ctx),
        )
        .await
    }

    pub async fn send_refund_processed(&self, return_id: &str) -> DispatchResult {
        let ctx = self.return_context(return_id).await?;
        self.notify_user(
            ctx.customer_user_id.as_deref(),
            TemplateData::RefundProcessed(RefundData::from_context(&ctx)),
            refs(&ctx),
        )
        .await
    }
}
