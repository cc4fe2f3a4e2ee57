#![deny(clippy::print_stdout, clippy::print_stderr)]

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

mod memory;

pub use memory::InMemoryInventoryService;

pub type ProductId = String;
pub type StockMovementId = String;

pub type InventoryResult<T> = Result<T, InventoryError>;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub cost_price: erp_money::Money,
    pub selling_price: erp_money::Money,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub cost_price: erp_money::Money,
    pub selling_price: erp_money::Money,
    pub category: Option<String>,
    pub brand: Option<String>,
}

impl CreateProductRequest {
    pub fn normalize(mut self) -> InventoryResult<Self> {
        self.sku = self.sku.trim().to_string();
        self.name = self.name.trim().to_string();
        if self.sku.is_empty() {
            return Err(InventoryError::Validation("sku cannot be empty".into()));
        }
        if self.name.is_empty() {
            return Err(InventoryError::Validation("name cannot be empty".into()));
        }
        Ok(self)
    }
}

/// Per (product, size) stock row. Never created implicitly by an adjust;
/// a size variant must be registered before it can be adjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub product_id: ProductId,
    pub size: String,
    pub quantity: i64,
    pub reorder_level: i64,
    pub max_level: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Purchase,
    Sale,
    Adjustment,
    Return,
}

/// Append-only audit trail; `StockItem.quantity` always equals the sum of
/// `quantity_change` over the movements for that (product, size).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: StockMovementId,
    pub product_id: ProductId,
    pub size: String,
    pub movement_type: MovementType,
    pub quantity_change: i64,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterStockItemRequest {
    pub product_id: ProductId,
    pub size: String,
    pub initial_quantity: i64,
    pub reorder_level: i64,
    pub max_level: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustStockRequest {
    pub product_id: ProductId,
    pub size: String,
    pub quantity_change: i64,
    pub reference: Option<String>,
    pub movement_type: MovementType,
}

impl AdjustStockRequest {
    pub fn validate_shape(&self) -> InventoryResult<()> {
        if self.quantity_change == 0 {
            return Err(InventoryError::Validation(
                "quantity_change cannot be zero".into(),
            ));
        }
        Ok(())
    }
}

/// A stock row whose quantity has fallen to or below its reorder level,
/// including the negative quantities the baseline permits rather than
/// blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockEntry {
    pub product_id: ProductId,
    pub size: String,
    pub quantity: i64,
    pub reorder_level: i64,
}

#[async_trait]
pub trait InventoryService: Send + Sync {
    async fn create_product(&self, request: CreateProductRequest) -> InventoryResult<Product>;
    async fn list_products(&self) -> InventoryResult<Vec<Product>>;
    async fn get_product(&self, id: &ProductId) -> InventoryResult<Product>;

    async fn register_stock_item(&self, request: RegisterStockItemRequest) -> InventoryResult<StockItem>;
    async fn get_stock_item(&self, product_id: &ProductId, size: &str) -> InventoryResult<StockItem>;

    /// Applies `quantity_change` atomically with the insertion of its
    /// `StockMovement`; never auto-creates the `StockItem` row.
    async fn adjust_stock(&self, request: AdjustStockRequest) -> InventoryResult<StockItem>;
    async fn list_movements(&self, product_id: &ProductId, size: &str) -> InventoryResult<Vec<StockMovement>>;

    async fn low_stock(&self) -> InventoryResult<Vec<LowStockEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_product_request_rejects_blank_sku() {
        let request = CreateProductRequest {
            sku: "   ".into(),
            name: "Shirt".into(),
            cost_price: erp_money::Money::from_minor(1_000),
            selling_price: erp_money::Money::from_minor(2_000),
            category: None,
            brand: None,
        };
        assert!(request.normalize().is_err());
    }

    #[test]
    fn adjust_stock_request_rejects_zero_delta() {
        let request = AdjustStockRequest {
            product_id: "prod-1".into(),
            size: "M".into(),
            quantity_change: 0,
            reference: None,
            movement_type: MovementType::Adjustment,
        };
        assert!(request.validate_shape().is_err());
    }
}
