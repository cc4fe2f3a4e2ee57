#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use erp_authz::AuthClient;
use erp_inventory_domain::AdjustStockRequest;
use erp_inventory_domain::CreateProductRequest;
use erp_inventory_domain::InMemoryInventoryService;
use erp_inventory_domain::InventoryError;
use erp_inventory_domain::InventoryService;
use erp_inventory_domain::LowStockEntry;
use erp_inventory_domain::MovementType;
use erp_inventory_domain::Product;
use erp_inventory_domain::ProductId;
use erp_inventory_domain::RegisterStockItemRequest;
use erp_inventory_domain::StockItem;
use serde::Deserialize;
use tokio::net::TcpListener;

struct Config {
    bind_addr: SocketAddr,
    auth_service_url: String,
}

impl Config {
    fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("INVENTORY_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8003".to_string())
                .parse()
                .expect("INVENTORY_BIND_ADDR must be a valid socket address"),
            auth_service_url: std::env::var("AUTH_SERVICE_URL").unwrap_or_else(|_| "http://127.0.0.1:8001".to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,inventory_service=debug".parse().unwrap()),
        )
        .init();

    let config = Config::from_env();
    let service: Arc<dyn InventoryService> = Arc::new(InMemoryInventoryService::default());
    let auth_client = Arc::new(AuthClient::new(config.auth_service_url.clone()));

    let app = router(service, auth_client);
    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "inventory-service listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Clone)]
struct ApiState {
    service: Arc<dyn InventoryService>,
}

fn router(service: Arc<dyn InventoryService>, auth_client: Arc<AuthClient>) -> Router {
    let authenticated = Router::new()
        .route("/api/v1/products", post(create_product_handler).get(list_products_handler))
        .route("/api/v1/products/{id}", get(get_product_handler))
        .route("/api/v1/stock/register", post(register_stock_handler))
        .route("/api/v1/stock/low", get(low_stock_handler))
        .route("/api/v1/stock/{product_id}/{size}/adjust", put(adjust_stock_handler))
        .route_layer(middleware::from_fn_with_state(auth_client, erp_authz::require_auth))
        .with_state(ApiState { service });

    Router::new().route("/health", get(health_handler)).merge(authenticated)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_product_handler(
    State(state): State<ApiState>,
    Json(body): Json<CreateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    state.service.create_product(body).await.map(Json).map_err(ApiError)
}

async fn list_products_handler(State(state): State<ApiState>) -> Result<Json<Vec<Product>>, ApiError> {
    state.service.list_products().await.map(Json).map_err(ApiError)
}

async fn get_product_handler(
    State(state): State<ApiState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>, ApiError> {
    state.service.get_product(&id).await.map(Json).map_err(ApiError)
}

async fn register_stock_handler(
    State(state): State<ApiState>,
    Json(body): Json<RegisterStockItemRequest>,
) -> Result<Json<StockItem>, ApiError> {
    state.service.register_stock_item(body).await.map(Json).map_err(ApiError)
}

#[derive(Debug, Deserialize)]
struct AdjustQuery {
    quantity_change: i64,
    #[serde(default)]
    reference_id: Option<String>,
}

/// Mirrors the single generic adjustment route the original inventory
/// backend exposes: the movement is always recorded as `adjustment`
/// regardless of caller. Sale/purchase/return movements are never created
/// here — they go through their own flows and call `adjust_stock` directly
/// with the right `MovementType`.
async fn adjust_stock_handler(
    State(state): State<ApiState>,
    Path((product_id, size)): Path<(ProductId, String)>,
    Query(query): Query<AdjustQuery>,
) -> Result<Json<StockItem>, ApiError> {
    let request = AdjustStockRequest {
        product_id,
        size,
        quantity_change: query.quantity_change,
        reference: query.reference_id,
        movement_type: MovementType::Adjustment,
    };
    request.validate_shape().map_err(ApiError)?;
    state.service.adjust_stock(request).await.map(Json).map_err(ApiError)
}

async fn low_stock_handler(State(state): State<ApiState>) -> Result<Json<Vec<LowStockEntry>>, ApiError> {
    state.service.low_stock().await.map(Json).map_err(ApiError)
}

#[derive(Debug)]
struct ApiError(InventoryError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            InventoryError::NotFound(_) => StatusCode::NOT_FOUND,
            InventoryError::Validation(_) => StatusCode::BAD_REQUEST,
            InventoryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "detail": self.0.to_string() }))).into_response()
    }
}
