use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::AdjustStockRequest;
use crate::CreateProductRequest;
use crate::InventoryError;
use crate::InventoryResult;
use crate::InventoryService;
use crate::LowStockEntry;
use crate::Product;
use crate::ProductId;
use crate::RegisterStockItemRequest;
use crate::StockItem;
use crate::StockMovement;

#[derive(Default)]
struct State {
    product_seq: u64,
    movement_seq: u64,
    products: HashMap<ProductId, Product>,
    stock: HashMap<(ProductId, String), StockItem>,
    movements: Vec<StockMovement>,
}

impl State {
    fn next_product_id(&mut self) -> ProductId {
        self.product_seq += 1;
        format!("prod-{}", self.product_seq)
    }

    fn next_movement_id(&mut self) -> String {
        self.movement_seq += 1;
        format!("mov-{}", self.movement_seq)
    }
}

#[derive(Default)]
pub struct InMemoryInventoryService {
    state: Mutex<State>,
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn create_product(&self, request: CreateProductRequest) -> InventoryResult<Product> {
        let request = request.normalize()?;
        let mut state = self.state.lock().await;

        if state.products.values().any(|p| p.sku == request.sku) {
            return Err(InventoryError::Validation(format!(
                "sku '{}' already exists",
                request.sku
            )));
        }

        let id = state.next_product_id();
        let product = Product {
            id: id.clone(),
            sku: request.sku,
            name: request.name,
            cost_price: request.cost_price,
            selling_price: request.selling_price,
            category: request.category,
            brand: request.brand,
            is_active: true,
        };
        state.products.insert(id, product.clone());
        Ok(product)
    }

    async fn list_products(&self) -> InventoryResult<Vec<Product>> {
        let state = self.state.lock().await;
        let mut products: Vec<Product> = state.products.values().cloned().collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(products)
    }

    async fn get_product(&self, id: &ProductId) -> InventoryResult<Product> {
        let state = self.state.lock().await;
        state
            .products
            .get(id)
            .cloned()
            .ok_or_else(|| InventoryError::NotFound(format!("product '{id}'")))
    }

    async fn register_stock_item(&self, request: RegisterStockItemRequest) -> InventoryResult<StockItem> {
        let mut state = self.state.lock().await;
        if !state.products.contains_key(&request.product_id) {
            return Err(InventoryError::NotFound(format!(
                "product '{}'",
                request.product_id
            )));
        }

        let key = (request.product_id.clone(), request.size.clone());
        if state.stock.contains_key(&key) {
            return Err(InventoryError::Validation(format!(
                "stock item for product '{}' size '{}' already exists",
                request.product_id, request.size
            )));
        }

        let item = StockItem {
            product_id: request.product_id,
            size: request.size,
            quantity: request.initial_quantity,
            reorder_level: request.reorder_level,
            max_level: request.max_level,
        };
        state.stock.insert(key, item.clone());
        Ok(item)
    }

    async fn get_stock_item(&self, product_id: &ProductId, size: &str) -> InventoryResult<StockItem> {
        let state = self.state.lock().await;
        state
            .stock
            .get(&(product_id.clone(), size.to_string()))
            .cloned()
            .ok_or_else(|| {
                InventoryError::NotFound(format!("stock item for product '{product_id}' size '{size}'"))
            })
    }

    async fn adjust_stock(&self, request: AdjustStockRequest) -> InventoryResult<StockItem> {
        request.validate_shape()?;
        let mut state = self.state.lock().await;

        let key = (request.product_id.clone(), request.size.clone());
        let Some(item) = state.stock.get_mut(&key) else {
            return Err(InventoryError::NotFound(format!(
                "stock item for product '{}' size '{}'",
                request.product_id, request.size
            )));
        };
        item.quantity += request.quantity_change;
        let updated = item.clone();

        let movement_id = state.next_movement_id();
        state.movements.push(StockMovement {
            id: movement_id,
            product_id: request.product_id,
            size: request.size,
            movement_type: request.movement_type,
            quantity_change: request.quantity_change,
            reference: request.reference,
            created_at: Utc::now(),
        });

        Ok(updated)
    }

    async fn list_movements(&self, product_id: &ProductId, size: &str) -> InventoryResult<Vec<StockMovement>> {
        let state = self.state.lock().await;
        Ok(state
            .movements
            .iter()
            .filter(|m| &m.product_id == product_id && m.size == size)
            .cloned()
            .collect())
    }

    async fn low_stock(&self) -> InventoryResult<Vec<LowStockEntry>> {
        let state = self.state.lock().await;
        let mut entries: Vec<LowStockEntry> = state
            .stock
            .values()
            .filter(|item| item.quantity <= item.reorder_level)
            .map(|item| LowStockEntry {
                product_id: item.product_id.clone(),
                size: item.size.clone(),
                quantity: item.quantity,
                reorder_level: item.reorder_level,
            })
            .collect();
        entries.sort_by(|a, b| (&a.product_id, &a.size).cmp(&(&b.product_id, &b.size)));
        Ok(entries)
    }
}
