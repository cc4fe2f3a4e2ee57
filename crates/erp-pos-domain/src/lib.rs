#![deny(clippy::print_stdout, clippy::print_stderr)]

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use erp_money::Money;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

mod broker;
mod clients;
mod memory;
mod pipeline;
mod settings;

pub use broker::SaleBroker;
pub use clients::HttpInventoryClient;
pub use clients::HttpLedgerClient;
pub use clients::InventoryAdjustClient;
pub use clients::LedgerPostClient;
pub use memory::InMemoryPosStore;
pub use pipeline::SalePipeline;
pub use settings::InMemorySettingsStore;
pub use settings::SettingsStore;

pub type SaleId = String;

pub type PosResult<T> = Result<T, PosError>;

#[derive(Debug, Error)]
pub enum PosError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("state conflict: {0}")]
    StateConflict(String),
    #[error("inventory service unavailable or rejected the stock adjustment: {0}")]
    InventoryUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Pending,
    Synced,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cashier {
    pub id: String,
    pub name: String,
}

/// A line as submitted by the register client, before totals are computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSaleItem {
    pub product_id: String,
    pub sku: Option<String>,
    pub name: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub size: Option<String>,
    #[serde(default = "zero_money")]
    pub discount: Money,
    #[serde(default = "zero_money")]
    pub tax: Money,
}

fn zero_money() -> Money {
    Money::ZERO
}

/// A line as persisted on the sale, carrying its computed `line_total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineItem {
    pub product_id: String,
    pub sku: Option<String>,
    pub name: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub size: Option<String>,
    pub discount: Money,
    pub tax: Money,
    pub line_total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: SaleId,
    pub sale_number: String,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub discount_amount: Money,
    pub total: Money,
    pub payment_method: String,
    pub tendered_amount: Option<Money>,
    pub change_amount: Option<Money>,
    pub customer_name: Option<String>,
    pub notes: Option<String>,
    pub cashier_id: String,
    pub cashier_name: String,
    pub created_at: DateTime<Utc>,
    pub status: SaleStatus,
    pub ledger_entry_id: Option<String>,
    pub items: Vec<SaleLineItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSaleRequest {
    pub items: Vec<NewSaleItem>,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    pub discount_amount: Option<Money>,
    pub tax_rate: Option<f64>,
    pub tendered_amount: Option<Money>,
    pub customer_name: Option<String>,
    pub notes: Option<String>,
}

fn default_payment_method() -> String {
    "cash".to_string()
}

impl NewSaleRequest {
    pub fn validate_shape(&self) -> PosResult<()> {
        if self.items.is_empty() {
            return Err(PosError::Validation("sale must contain at least one item".into()));
        }
        for (index, item) in self.items.iter().enumerate() {
            if item.quantity <= 0 {
                return Err(PosError::Validation(format!(
                    "item {index}: quantity must be greater than zero"
                )));
            }
            if item.size.is_none() {
                return Err(PosError::Validation(format!(
                    "item {index}: size is required so the stock decrement is never skipped"
                )));
            }
        }
        Ok(())
    }
}

/// Tax-exclusive, decimal-2 pricing. Grounded on the cash-register math in
/// §4.5: `line_total = round2(qty*price - discount + tax)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleTotals {
    pub subtotal: Money,
    pub tax_amount: Money,
    pub total: Money,
    pub change: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub tax_rate: f64,
    pub tax_inclusive: bool,
    pub currency: String,
    pub low_stock_threshold: i64,
    pub cash_account_name: String,
    pub revenue_account_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tax_rate: 0.14,
            tax_inclusive: false,
            currency: "USD".into(),
            low_stock_threshold: 5,
            cash_account_name: "Cash in Bank - Checking".into(),
            revenue_account_name: "Sales Revenue".into(),
        }
    }
}

/// Computes `SaleLineItem`s and aggregate totals for a `NewSaleRequest`,
/// rejecting cash sales where tendered is less than the total.
pub fn compute_sale(request: &NewSaleRequest, settings: &Settings) -> PosResult<(Vec<SaleLineItem>, SaleTotals)> {
    request.validate_shape()?;

    let items: Vec<SaleLineItem> = request
        .items
        .iter()
        .map(|item| {
            let gross = Money::round2(item.quantity as f64 * item.unit_price.as_f64())
                .map_err(|e| PosError::Validation(e.to_string()))?;
            let line_total = gross - item.discount + item.tax;
            Ok(SaleLineItem {
                product_id: item.product_id.clone(),
                sku: item.sku.clone(),
                name: item.name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                size: item.size.clone(),
                discount: item.discount,
                tax: item.tax,
                line_total,
            })
        })
        .collect::<PosResult<Vec<_>>>()?;

    let subtotal: Money = items.iter().map(|item| item.line_total).sum();
    let discount_amount = request.discount_amount.unwrap_or(Money::ZERO);
    let tax_rate = request.tax_rate.unwrap_or(settings.tax_rate);

    // Tax-inclusive: line prices already carry the tax, so it is backed out
    // of the subtotal rather than added on top; the subtotal itself is left
    // unadjusted (it still reflects what the customer was charged).
    let tax_amount = if settings.tax_inclusive {
        Money::round2(subtotal.as_f64() - subtotal.as_f64() / (1.0 + tax_rate))
            .map_err(|e| PosError::Validation(e.to_string()))?
    } else {
        Money::round2(subtotal.as_f64() * tax_rate).map_err(|e| PosError::Validation(e.to_string()))?
    };

    let total = if settings.tax_inclusive {
        subtotal - discount_amount
    } else {
        subtotal + tax_amount - discount_amount
    };

    let change = match request.tendered_amount {
        Some(tendered) => {
            if tendered.minor() < total.minor() {
                return Err(PosError::Validation(format!(
                    "tendered amount {tendered} is less than total {total}"
                )));
            }
            Some(tendered - total)
        }
        None => None,
    };

    Ok((
        items,
        SaleTotals {
            subtotal,
            tax_amount,
            total,
            change,
        },
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleVoidRecord {
    pub id: String,
    pub sale_id: SaleId,
    pub sale_number: String,
    pub reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub compensating_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundLine {
    pub product_id: String,
    pub size: Option<String>,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub items: Vec<RefundLine>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRefundRecord {
    pub id: String,
    pub sale_id: SaleId,
    pub sale_number: String,
    pub amount: Money,
    pub items: Vec<RefundLine>,
    pub reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub compensating_reference: String,
}

#[async_trait]
pub trait PosStore: Send + Sync {
    async fn insert_pending(&self, sale: Sale) -> PosResult<Sale>;
    async fn get_by_number(&self, sale_number: &str) -> PosResult<Sale>;
    async fn list(&self) -> PosResult<Vec<Sale>>;
    async fn mark_synced(&self, sale_number: &str, ledger_entry_id: String) -> PosResult<Sale>;
    async fn mark_failed(&self, sale_number: &str) -> PosResult<Sale>;
    /// Boot-time recovery scan: sales left `pending` or `failed` by a prior
    /// process that never finished the broker round trip.
    async fn pending_and_failed(&self) -> PosResult<Vec<Sale>>;
    async fn insert_void(&self, record: SaleVoidRecord) -> PosResult<SaleVoidRecord>;
    async fn insert_refund(&self, record: SaleRefundRecord) -> PosResult<SaleRefundRecord>;
}

#[async_trait]
pub trait PosService: Send + Sync {
    async fn create_sale(&self, request: NewSaleRequest, cashier: Cashier, bearer_token: &str) -> PosResult<Sale>;
    async fn get_sale(&self, sale_number: &str) -> PosResult<Sale>;
    async fn list_sales(&self) -> PosResult<Vec<Sale>>;
    async fn void_sale(
        &self,
        sale_number: &str,
        actor: String,
        reason: Option<String>,
        bearer_token: &str,
    ) -> PosResult<SaleVoidRecord>;
    async fn refund_sale(
        &self,
        sale_number: &str,
        request: RefundRequest,
        actor: String,
        bearer_token: &str,
    ) -> PosResult<SaleRefundRecord>;

    /// Boot-time recovery: re-enqueues every sale left `pending`/`failed` by
    /// a prior process so the broker round trip finishes.
    async fn recover_pending_sales(&self, bearer_token: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i64, unit_price_minor: i64, size: Option<&str>) -> NewSaleItem {
        NewSaleItem {
            product_id: "prod-1".into(),
            sku: None,
            name: None,
            quantity,
            unit_price: Money::from_minor(unit_price_minor),
            size: size.map(str::to_string),
            discount: Money::ZERO,
            tax: Money::ZERO,
        }
    }

    #[test]
    fn balanced_sale_matches_the_worked_example() {
        let request = NewSaleRequest {
            items: vec![item(2, 5_000, Some("M"))],
            payment_method: "cash".into(),
            discount_amount: None,
            tax_rate: Some(0.14),
            tendered_amount: Some(Money::from_minor(12_000)),
            customer_name: None,
            notes: None,
        };
        let (items, totals) = compute_sale(&request, &Settings::default()).expect("compute");
        assert_eq!(items[0].line_total, Money::from_minor(10_000));
        assert_eq!(totals.subtotal, Money::from_minor(10_000));
        assert_eq!(totals.tax_amount, Money::from_minor(1_400));
        assert_eq!(totals.total, Money::from_minor(11_400));
        assert_eq!(totals.change, Some(Money::from_minor(600)));
    }

    #[test]
    fn insufficient_tendered_is_rejected() {
        let request = NewSaleRequest {
            items: vec![item(1, 10_000, Some("M"))],
            payment_method: "cash".into(),
            discount_amount: None,
            tax_rate: Some(0.0),
            tendered_amount: Some(Money::from_minor(5_000)),
            customer_name: None,
            notes: None,
        };
        assert!(compute_sale(&request, &Settings::default()).is_err());
    }

    #[test]
    fn sale_line_without_size_is_rejected() {
        let request = NewSaleRequest {
            items: vec![item(1, 10_000, None)],
            payment_method: "cash".into(),
            discount_amount: None,
            tax_rate: Some(0.0),
            tendered_amount: None,
            customer_name: None,
            notes: None,
        };
        assert!(matches!(
            compute_sale(&request, &Settings::default()),
            Err(PosError::Validation(_))
        ));
    }

    #[test]
    fn empty_sale_is_rejected() {
        let request = NewSaleRequest {
            items: vec![],
            payment_method: "cash".into(),
            discount_amount: None,
            tax_rate: None,
            tendered_amount: None,
            customer_name: None,
            notes: None,
        };
        assert!(compute_sale(&request, &Settings::default()).is_err());
    }
}
