use erp_inventory_domain::AdjustStockRequest;
use erp_inventory_domain::CreateProductRequest;
use erp_inventory_domain::InMemoryInventoryService;
use erp_inventory_domain::InventoryService;
use erp_inventory_domain::MovementType;
use erp_inventory_domain::RegisterStockItemRequest;
use erp_money::Money;

async fn product(service: &InMemoryInventoryService, sku: &str) -> String {
    service
        .create_product(CreateProductRequest {
            sku: sku.into(),
            name: "Test Product".into(),
            cost_price: Money::from_minor(500),
            selling_price: Money::from_minor(1_000),
            category: None,
            brand: None,
        })
        .await
        .expect("create product")
        .id
}

#[tokio::test]
async fn duplicate_sku_is_rejected() {
    let service = InMemoryInventoryService::default();
    product(&service, "DUP-1").await;

    let err = service
        .create_product(CreateProductRequest {
            sku: "DUP-1".into(),
            name: "Other".into(),
            cost_price: Money::from_minor(500),
            selling_price: Money::from_minor(1_000),
            category: None,
            brand: None,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn stock_quantity_always_equals_sum_of_movements() {
    let service = InMemoryInventoryService::default();
    let product_id = product(&service, "SUM-1").await;
    service
        .register_stock_item(RegisterStockItemRequest {
            product_id: product_id.clone(),
            size: "L".into(),
            initial_quantity: 0,
            reorder_level: 5,
            max_level: 100,
        })
        .await
        .expect("register stock item");

    service
        .adjust_stock(AdjustStockRequest {
            product_id: product_id.clone(),
            size: "L".into(),
            quantity_change: 20,
            reference: Some("PO-1".into()),
            movement_type: MovementType::Purchase,
        })
        .await
        .expect("purchase");
    service
        .adjust_stock(AdjustStockRequest {
            product_id: product_id.clone(),
            size: "L".into(),
            quantity_change: -6,
            reference: Some("POSSALE-1".into()),
            movement_type: MovementType::Sale,
        })
        .await
        .expect("sale");

    let item = service.get_stock_item(&product_id, "L").await.expect("get");
    let movements = service.list_movements(&product_id, "L").await.expect("movements");
    let sum: i64 = movements.iter().map(|m| m.quantity_change).sum();
    assert_eq!(item.quantity, sum);
    assert_eq!(item.quantity, 14);
}

#[tokio::test]
async fn adjusting_unregistered_stock_item_is_an_error() {
    let service = InMemoryInventoryService::default();
    let product_id = product(&service, "NOREG-1").await;

    let err = service
        .adjust_stock(AdjustStockRequest {
            product_id,
            size: "M".into(),
            quantity_change: 1,
            reference: None,
            movement_type: MovementType::Adjustment,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}
