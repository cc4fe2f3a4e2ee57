use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use erp_money::Money;
use uuid::Uuid;

use crate::Cashier;
use crate::InventoryAdjustClient;
use crate::LedgerPostClient;
use crate::NewSaleRequest;
use crate::PosError;
use crate::PosResult;
use crate::PosService;
use crate::PosStore;
use crate::RefundLine;
use crate::RefundRequest;
use crate::Sale;
use crate::SaleBroker;
use crate::SaleRefundRecord;
use crate::SaleStatus;
use crate::SaleVoidRecord;
use crate::SettingsStore;
use crate::compute_sale;

const SALE_REFERENCE_PREFIX: &str = "POSSALE-";
const VOID_REFERENCE_PREFIX: &str = "POSVOID-";
const REFUND_REFERENCE_PREFIX: &str = "POSREFUND-";

/// Wires the store, the Inventory/Ledger HTTP clients, and the broker into
/// the sale pipeline described in the component design: stock decrement
/// before local persistence, `pending` status, then async ledger publish.
pub struct SalePipeline {
    store: Arc<dyn PosStore>,
    inventory: Arc<dyn InventoryAdjustClient>,
    ledger: Arc<dyn LedgerPostClient>,
    broker: SaleBroker,
    settings: Arc<dyn SettingsStore>,
}

impl SalePipeline {
    #[must_use]
    pub fn new(
        store: Arc<dyn PosStore>,
        inventory: Arc<dyn InventoryAdjustClient>,
        ledger: Arc<dyn LedgerPostClient>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let broker = SaleBroker::spawn(store.clone(), ledger.clone());
        Self {
            store,
            inventory,
            ledger,
            broker,
            settings,
        }
    }

    fn generate_sale_number() -> String {
        let suffix = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        format!("POS-{}-{}", Utc::now().format("%Y%m%d"), &suffix[..6])
    }
}

#[async_trait]
impl PosService for SalePipeline {
    async fn create_sale(&self, request: NewSaleRequest, cashier: Cashier, bearer_token: &str) -> PosResult<Sale> {
        let settings = self.settings.current().await;
        let (items, totals) = compute_sale(&request, &settings)?;

        // Decrement stock line-by-line, in order, before anything is persisted:
        // if any call fails the sale never existed, so overselling under a
        // network failure is structurally impossible. `validate_shape`
        // already rejected any line without a size, so every line decrements.
        for item in &items {
            let size = item
                .size
                .as_deref()
                .ok_or_else(|| PosError::Internal(format!("line for '{}' is missing its required size", item.product_id)))?;
            let reference = format!("{SALE_REFERENCE_PREFIX}{}", item.product_id);
            self.inventory
                .adjust_stock(&item.product_id, size, -item.quantity, &reference, bearer_token)
                .await?;
        }

        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            sale_number: Self::generate_sale_number(),
            subtotal: totals.subtotal,
            tax_amount: totals.tax_amount,
            discount_amount: request.discount_amount.unwrap_or(Money::ZERO),
            total: totals.total,
            payment_method: request.payment_method,
            tendered_amount: request.tendered_amount,
            change_amount: totals.change,
            customer_name: request.customer_name,
            notes: request.notes,
            cashier_id: cashier.id,
            cashier_name: cashier.name,
            created_at: Utc::now(),
            status: SaleStatus::Pending,
            ledger_entry_id: None,
            items,
        };

        let sale = self.store.insert_pending(sale).await?;
        self.broker.publish(sale.sale_number.clone(), bearer_token.to_string());
        Ok(sale)
    }

    async fn get_sale(&self, sale_number: &str) -> PosResult<Sale> {
        self.store.get_by_number(sale_number).await
    }

    async fn list_sales(&self) -> PosResult<Vec<Sale>> {
        self.store.list().await
    }

    async fn void_sale(
        &self,
        sale_number: &str,
        actor: String,
        reason: Option<String>,
        bearer_token: &str,
    ) -> PosResult<SaleVoidRecord> {
        let sale = self.store.get_by_number(sale_number).await?;

        for item in &sale.items {
            if let Some(size) = &item.size {
                let reference = format!("{VOID_REFERENCE_PREFIX}{}", item.product_id);
                self.inventory
                    .adjust_stock(&item.product_id, size, item.quantity, &reference, bearer_token)
                    .await?;
            }
        }

        let compensating_reference = format!("VOID-{sale_number}");
        self.ledger
            .post_compensating_transaction(
                &compensating_reference,
                &format!("Void of sale {sale_number}"),
                sale.total,
                bearer_token,
            )
            .await?;

        self.store
            .insert_void(SaleVoidRecord {
                id: Uuid::new_v4().to_string(),
                sale_id: sale.id,
                sale_number: sale.sale_number,
                reason,
                created_by: actor,
                created_at: Utc::now(),
                compensating_reference,
            })
            .await
    }

    async fn refund_sale(
        &self,
        sale_number: &str,
        request: RefundRequest,
        actor: String,
        bearer_token: &str,
    ) -> PosResult<SaleRefundRecord> {
        let sale = self.store.get_by_number(sale_number).await?;
        let amount = refund_amount(&sale, &request.items)?;

        for line in &request.items {
            if let Some(size) = &line.size {
                let reference = format!("{REFUND_REFERENCE_PREFIX}{}", line.product_id);
                self.inventory
                    .adjust_stock(&line.product_id, size, line.quantity, &reference, bearer_token)
                    .await?;
            }
        }

        let compensating_reference = format!("REFUND-{sale_number}-{}", Uuid::new_v4().simple());
        self.ledger
            .post_compensating_transaction(
                &compensating_reference,
                &format!("Refund of sale {sale_number}"),
                amount,
                bearer_token,
            )
            .await?;

        self.store
            .insert_refund(SaleRefundRecord {
                id: Uuid::new_v4().to_string(),
                sale_id: sale.id,
                sale_number: sale.sale_number,
                amount,
                items: request.items,
                reason: request.reason,
                created_by: actor,
                created_at: Utc::now(),
                compensating_reference,
            })
            .await
    }

    async fn recover_pending_sales(&self, bearer_token: &str) {
        self.broker.recover_pending(self.store.as_ref(), bearer_token).await;
    }
}

/// Produces the sale amount for a refund against the original line prices,
/// rejecting a request for more than was originally sold.
fn refund_amount(sale: &Sale, lines: &[RefundLine]) -> PosResult<Money> {
    let mut total = Money::ZERO;
    for line in lines {
        let original = sale
            .items
            .iter()
            .find(|item| item.product_id == line.product_id && item.size == line.size)
            .ok_or_else(|| PosError::Validation(format!("sale has no line for product '{}'", line.product_id)))?;
        if line.quantity > original.quantity {
            return Err(PosError::Validation(format!(
                "cannot refund {} units of '{}', only {} were sold",
                line.quantity, line.product_id, original.quantity
            )));
        }
        total = total
            + Money::round2(line.quantity as f64 * original.unit_price.as_f64())
                .map_err(|e| PosError::Validation(e.to_string()))?;
    }
    Ok(total)
}
