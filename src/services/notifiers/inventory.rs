use super::{context, DispatchOutcome, DispatchResult, Dispatcher, Refs, SkipReason, SweepReport};
use crate::db::models::ProductContext;
use crate::db::MarketplaceRepository;
use crate::error::NotificationError;
use crate::services::templates::{StockData, TemplateData};

impl Dispatcher {
    async fn product_name(&self, product_id: &str) -> Result<Option<String>, NotificationError> {
        Ok(MarketplaceRepository::product_context(&self.pool, product_id)
            .await?
            .and_then(|p| p.name))
    }

    async fn notify_vendor_stock(&self, vendor_id: &str, data: TemplateData) -> DispatchResult {
        let vendor = context(
            MarketplaceRepository::vendor_contact(&self.pool, vendor_id).await?,
            "vendor",
            vendor_id,
        )?;
        self.notify_user(vendor.user_id.as_deref(), data, Refs::default())
            .await
    }

    pub async fn send_low_stock_alert(
        &self,
        product_id: &str,
        vendor_id: &str,
        stock: i64,
    ) -> DispatchResult {
        let data = StockData {
            product_id: product_id.to_string(),
            product_name: self.product_name(product_id).await?,
            stock,
        };
        self.notify_vendor_stock(vendor_id, TemplateData::LowStock(data))
            .await
    }

    pub async fn send_out_of_stock_alert(&self, product_id: &str, vendor_id: &str) -> DispatchResult {
        let data = StockData {
            product_id: product_id.to_string(),
            product_name: self.product_name(product_id).await?,
            stock: 0,
        };
        self.notify_vendor_stock(vendor_id, TemplateData::OutOfStock(data))
            .await
    }

    /// Alert the owning vendor if the product is at or below the low-stock
    /// threshold. Zero stock sends the out-of-stock alert instead.
    pub async fn check_product_stock(&self, product_id: &str) -> DispatchResult {
        let product = context(
            MarketplaceRepository::product_context(&self.pool, product_id).await?,
            "product",
            product_id,
        )?;
        self.stock_alert(&product).await
    }

    async fn stock_alert(&self, product: &ProductContext) -> DispatchResult {
        if product.stock_quantity > self.sweeps.low_stock_threshold {
            return Ok(DispatchOutcome::skipped(SkipReason::BelowThreshold));
        }

        let data = StockData {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            stock: product.stock_quantity,
        };
        let data = if product.stock_quantity <= 0 {
            TemplateData::OutOfStock(data)
        } else {
            TemplateData::LowStock(data)
        };

        self.notify_user(product.vendor_user_id.as_deref(), data, Refs::default())
            .await
    }

    /// Alert on every product at or below the threshold. Nothing records
    /// that a product was already alerted, so each run re-notifies.
    pub async fn sweep_inventory(&self) -> Result<SweepReport, NotificationError> {
        let products =
            MarketplaceRepository::low_stock_products(&self.pool, self.sweeps.low_stock_threshold)
                .await?;

        let mut report = SweepReport {
            scanned: products.len(),
            ..Default::default()
        };
        for product in &products {
            let result = self.stock_alert(product).await;
            if let Err(e) = &result {
                tracing::warn!(product_id = %product.id, "Stock alert failed: {}", e);
            }
            report.record(&result);
        }

        tracing::info!(
            scanned = report.scanned,
            notified = report.notified,
            skipped = report.skipped,
            failed = report.failed,
            "Inventory sweep finished"
        );
        Ok(report)
    }
}
