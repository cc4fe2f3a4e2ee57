#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Extension;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use erp_authz::AuthClient;
use erp_authz::AuthenticatedUser;
use erp_authz::require_role;
use erp_pos_domain::Cashier;
use erp_pos_domain::HttpInventoryClient;
use erp_pos_domain::HttpLedgerClient;
use erp_pos_domain::InMemoryPosStore;
use erp_pos_domain::InMemorySettingsStore;
use erp_pos_domain::NewSaleRequest;
use erp_pos_domain::PosError;
use erp_pos_domain::PosService;
use erp_pos_domain::RefundRequest;
use erp_pos_domain::Sale;
use erp_pos_domain::SalePipeline;
use erp_pos_domain::SaleRefundRecord;
use erp_pos_domain::SaleVoidRecord;
use erp_pos_domain::Settings;
use erp_pos_domain::SettingsStore;
use serde::Deserialize;
use tokio::net::TcpListener;

struct Config {
    bind_addr: SocketAddr,
    auth_service_url: String,
    inventory_service_url: String,
    ledger_service_url: String,
    bootstrap_token: String,
}

impl Config {
    fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("POS_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8004".to_string())
                .parse()
                .expect("POS_BIND_ADDR must be a valid socket address"),
            auth_service_url: std::env::var("AUTH_SERVICE_URL").unwrap_or_else(|_| "http://127.0.0.1:8001".to_string()),
            inventory_service_url: std::env::var("INVENTORY_SERVICE_URL").unwrap_or_else(|_| "http://127.0.0.1:8003".to_string()),
            ledger_service_url: std::env::var("LEDGER_SERVICE_URL").unwrap_or_else(|_| "http://127.0.0.1:8002".to_string()),
            bootstrap_token: std::env::var("POS_RECOVERY_BEARER_TOKEN").unwrap_or_default(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,pos_service=debug".parse().unwrap()),
        )
        .init();

    let config = Config::from_env();
    let settings_store: Arc<dyn SettingsStore> = Arc::new(InMemorySettingsStore::new(Settings::default()));
    let inventory = Arc::new(HttpInventoryClient::new(config.inventory_service_url.clone()));
    let default_settings = Settings::default();
    let ledger = Arc::new(HttpLedgerClient::new(
        config.ledger_service_url.clone(),
        default_settings.cash_account_name.clone(),
        default_settings.revenue_account_name.clone(),
    ));
    let store = Arc::new(InMemoryPosStore::default());
    let service: Arc<dyn PosService> = Arc::new(SalePipeline::new(store, inventory, ledger, settings_store.clone()));
    let auth_client = Arc::new(AuthClient::new(config.auth_service_url.clone()));

    if !config.bootstrap_token.is_empty() {
        service.recover_pending_sales(&config.bootstrap_token).await;
    }

    let app = router(service, settings_store, auth_client);
    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "pos-service listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Clone)]
struct ApiState {
    service: Arc<dyn PosService>,
    settings: Arc<dyn SettingsStore>,
}

fn router(service: Arc<dyn PosService>, settings: Arc<dyn SettingsStore>, auth_client: Arc<AuthClient>) -> Router {
    let authenticated = Router::new()
        .route("/api/v1/sales", post(create_sale_handler).get(list_sales_handler))
        .route("/api/v1/sales/{sale_number}", get(get_sale_handler))
        .route("/api/v1/sales/{sale_number}/void", post(void_sale_handler))
        .route("/api/v1/sales/{sale_number}/refund", post(refund_sale_handler))
        .route("/api/v1/settings", get(get_settings_handler).put(put_settings_handler))
        .route_layer(middleware::from_fn_with_state(auth_client, erp_authz::require_auth))
        .with_state(ApiState { service, settings });

    Router::new().route("/health", get(health_handler)).merge(authenticated)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn bearer_token(headers: &axum::http::HeaderMap) -> &str {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default()
}

async fn create_sale_handler(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: axum::http::HeaderMap,
    Json(body): Json<NewSaleRequest>,
) -> Result<Json<Sale>, ApiError> {
    let cashier = Cashier {
        id: user.id.clone(),
        name: user.username.clone(),
    };
    let token = bearer_token(&headers).to_string();
    state.service.create_sale(body, cashier, &token).await.map(Json).map_err(ApiError::from)
}

async fn get_sale_handler(
    State(state): State<ApiState>,
    Path(sale_number): Path<String>,
) -> Result<Json<Sale>, ApiError> {
    state.service.get_sale(&sale_number).await.map(Json).map_err(ApiError::from)
}

async fn list_sales_handler(State(state): State<ApiState>) -> Result<Json<Vec<Sale>>, ApiError> {
    state.service.list_sales().await.map(Json).map_err(ApiError::from)
}

#[derive(Debug, Deserialize)]
struct VoidRequest {
    #[serde(default)]
    reason: Option<String>,
}

async fn void_sale_handler(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: axum::http::HeaderMap,
    Path(sale_number): Path<String>,
    Json(body): Json<VoidRequest>,
) -> Result<Json<SaleVoidRecord>, ApiError> {
    require_role(&user, "manager").map_err(ApiError::from_authz)?;
    let token = bearer_token(&headers).to_string();
    state
        .service
        .void_sale(&sale_number, user.id.clone(), body.reason, &token)
        .await
        .map(Json)
        .map_err(ApiError::from)
}

async fn refund_sale_handler(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: axum::http::HeaderMap,
    Path(sale_number): Path<String>,
    Json(body): Json<RefundRequest>,
) -> Result<Json<SaleRefundRecord>, ApiError> {
    require_role(&user, "manager").map_err(ApiError::from_authz)?;
    let token = bearer_token(&headers).to_string();
    state
        .service
        .refund_sale(&sale_number, body, user.id.clone(), &token)
        .await
        .map(Json)
        .map_err(ApiError::from)
}

async fn get_settings_handler(State(state): State<ApiState>) -> Json<Settings> {
    Json(state.settings.current().await)
}

async fn put_settings_handler(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<Settings>,
) -> Result<Json<Settings>, ApiError> {
    require_role(&user, "admin").map_err(ApiError::from_authz)?;
    state.settings.update(body.clone()).await;
    Ok(Json(body))
}

#[derive(Debug)]
enum ApiErrorKind {
    Pos(PosError),
    Authz(erp_authz::AuthzError),
}

#[derive(Debug)]
struct ApiError(ApiErrorKind);

impl ApiError {
    fn from_authz(error: erp_authz::AuthzError) -> Self {
        ApiError(ApiErrorKind::Authz(error))
    }
}

impl From<PosError> for ApiError {
    fn from(error: PosError) -> Self {
        ApiError(ApiErrorKind::Pos(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            ApiErrorKind::Authz(error) => error.into_response(),
            ApiErrorKind::Pos(error) => {
                let status = match error {
                    PosError::NotFound(_) => StatusCode::NOT_FOUND,
                    PosError::Validation(_) => StatusCode::BAD_REQUEST,
                    PosError::StateConflict(_) => StatusCode::CONFLICT,
                    PosError::InventoryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    PosError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, Json(serde_json::json!({ "detail": error.to_string() }))).into_response()
            }
        }
    }
}
