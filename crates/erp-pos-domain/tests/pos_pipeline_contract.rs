use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use erp_money::Money;
use erp_pos_domain::Cashier;
use erp_pos_domain::InMemoryPosStore;
use erp_pos_domain::InventoryAdjustClient;
use erp_pos_domain::LedgerPostClient;
use erp_pos_domain::NewSaleItem;
use erp_pos_domain::NewSaleRequest;
use erp_pos_domain::PosError;
use erp_pos_domain::PosService;
use erp_pos_domain::PosStore;
use erp_pos_domain::Sale;
use erp_pos_domain::SalePipeline;
use erp_pos_domain::SaleStatus;
use erp_pos_domain::InMemorySettingsStore;
use erp_pos_domain::Settings;

struct AlwaysOkInventory;

#[async_trait]
impl InventoryAdjustClient for AlwaysOkInventory {
    async fn adjust_stock(
        &self,
        _product_id: &str,
        _size: &str,
        _quantity_change: i64,
        _reference_id: &str,
        _bearer_token: &str,
    ) -> Result<(), PosError> {
        Ok(())
    }
}

struct FailingInventory;

#[async_trait]
impl InventoryAdjustClient for FailingInventory {
    async fn adjust_stock(
        &self,
        _product_id: &str,
        _size: &str,
        _quantity_change: i64,
        _reference_id: &str,
        _bearer_token: &str,
    ) -> Result<(), PosError> {
        Err(PosError::InventoryUnavailable("timed out".into()))
    }
}

struct AlwaysOkLedger {
    posted_compensating: AtomicBool,
}

impl Default for AlwaysOkLedger {
    fn default() -> Self {
        Self {
            posted_compensating: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl LedgerPostClient for AlwaysOkLedger {
    async fn post_sale_transaction(&self, sale: &Sale, _bearer_token: &str) -> Result<String, PosError> {
        Ok(format!("ledger-{}", sale.sale_number))
    }

    async fn post_compensating_transaction(
        &self,
        reference: &str,
        _description: &str,
        _amount: Money,
        _bearer_token: &str,
    ) -> Result<String, PosError> {
        self.posted_compensating.store(true, Ordering::SeqCst);
        Ok(format!("ledger-{reference}"))
    }
}

fn sale_request() -> NewSaleRequest {
    NewSaleRequest {
        items: vec![NewSaleItem {
            product_id: "prod-1".into(),
            sku: None,
            name: None,
            quantity: 2,
            unit_price: Money::from_minor(5_000),
            size: Some("M".into()),
            discount: Money::ZERO,
            tax: Money::ZERO,
        }],
        payment_method: "cash".into(),
        discount_amount: None,
        tax_rate: Some(0.14),
        tendered_amount: Some(Money::from_minor(12_000)),
        customer_name: None,
        notes: None,
    }
}

fn cashier() -> Cashier {
    Cashier {
        id: "user-1".into(),
        name: "Cashier One".into(),
    }
}

#[tokio::test]
async fn balanced_sale_persists_pending_then_broker_syncs_it() {
    let store: Arc<InMemoryPosStore> = Arc::new(InMemoryPosStore::default());
    let pipeline = SalePipeline::new(
        store.clone(),
        Arc::new(AlwaysOkInventory),
        Arc::new(AlwaysOkLedger::default()),
        Arc::new(InMemorySettingsStore::new(Settings::default())),
    );

    let sale = pipeline
        .create_sale(sale_request(), cashier(), "token")
        .await
        .expect("create sale");

    assert_eq!(sale.subtotal, Money::from_minor(10_000));
    assert_eq!(sale.tax_amount, Money::from_minor(1_400));
    assert_eq!(sale.total, Money::from_minor(11_400));
    assert_eq!(sale.change_amount, Some(Money::from_minor(600)));
    assert_eq!(sale.status, SaleStatus::Pending);

    // give the broker's background task a chance to run
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let synced = store.get_by_number(&sale.sale_number).await.expect("sale exists");
    assert_eq!(synced.status, SaleStatus::Synced);
    assert!(synced.ledger_entry_id.is_some());
}

#[tokio::test]
async fn inventory_outage_leaves_no_sale_row() {
    let store: Arc<InMemoryPosStore> = Arc::new(InMemoryPosStore::default());
    let pipeline = SalePipeline::new(
        store.clone(),
        Arc::new(FailingInventory),
        Arc::new(AlwaysOkLedger::default()),
        Arc::new(InMemorySettingsStore::new(Settings::default())),
    );

    let err = pipeline
        .create_sale(sale_request(), cashier(), "token")
        .await
        .unwrap_err();
    assert!(matches!(err, PosError::InventoryUnavailable(_)));

    let sales = store.list().await.expect("list");
    assert!(sales.is_empty());
}

#[tokio::test]
async fn void_posts_compensating_transaction_without_mutating_original() {
    let store: Arc<InMemoryPosStore> = Arc::new(InMemoryPosStore::default());
    let pipeline = SalePipeline::new(
        store.clone(),
        Arc::new(AlwaysOkInventory),
        Arc::new(AlwaysOkLedger::default()),
        Arc::new(InMemorySettingsStore::new(Settings::default())),
    );

    let sale = pipeline
        .create_sale(sale_request(), cashier(), "token")
        .await
        .expect("create sale");

    let void = pipeline
        .void_sale(&sale.sale_number, "manager-1".into(), Some("customer return".into()), "token")
        .await
        .expect("void sale");

    assert_eq!(void.sale_number, sale.sale_number);
    assert!(void.compensating_reference.starts_with("VOID-"));

    let original = store.get_by_number(&sale.sale_number).await.expect("sale still exists");
    assert_eq!(original.total, sale.total);
    assert_eq!(original.status, sale.status);
}
