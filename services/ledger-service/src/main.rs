#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Extension;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use chrono::Utc;
use erp_authz::AuthClient;
use erp_authz::AuthenticatedUser;
use erp_authz::require_permission;
use erp_ledger_domain::Account;
use erp_ledger_domain::CreateAccountRequest;
use erp_ledger_domain::CreatePeriodRequest;
use erp_ledger_domain::InMemoryLedgerService;
use erp_ledger_domain::LedgerError;
use erp_ledger_domain::LedgerService;
use erp_ledger_domain::Period;
use erp_ledger_domain::PeriodId;
use erp_ledger_domain::PostTransactionRequest;
use erp_ledger_domain::Transaction;
use erp_ledger_domain::TransactionFilter;
use erp_ledger_domain::TransactionId;
use serde::Deserialize;
use tokio::net::TcpListener;

struct Config {
    bind_addr: SocketAddr,
    auth_service_url: String,
}

impl Config {
    fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("LEDGER_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8002".to_string())
                .parse()
                .expect("LEDGER_BIND_ADDR must be a valid socket address"),
            auth_service_url: std::env::var("AUTH_SERVICE_URL").unwrap_or_else(|_| "http://127.0.0.1:8001".to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,ledger_service=debug".parse().unwrap()),
        )
        .init();

    let config = Config::from_env();
    let service: Arc<dyn LedgerService> = Arc::new(InMemoryLedgerService::new());
    let auth_client = Arc::new(AuthClient::new(config.auth_service_url.clone()));

    let app = router(service, auth_client);
    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "ledger-service listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Clone)]
struct ApiState {
    service: Arc<dyn LedgerService>,
}

fn router(service: Arc<dyn LedgerService>, auth_client: Arc<AuthClient>) -> Router {
    let authenticated = Router::new()
        .route("/api/v1/accounts", post(create_account_handler).get(list_accounts_handler))
        .route("/api/v1/transactions", post(post_transaction_handler).get(list_transactions_handler))
        .route("/api/v1/transactions/{id}", get(get_transaction_handler))
        .route("/api/v1/reports/{kind}", get(report_handler))
        .route("/api/v1/periods", post(create_period_handler).get(list_periods_handler))
        .route("/api/v1/periods/{id}/close", post(close_period_handler))
        .route("/api/v1/periods/{id}/lock", post(lock_period_handler))
        .route("/api/v1/periods/{id}/reopen", post(reopen_period_handler))
        .route_layer(middleware::from_fn_with_state(auth_client, erp_authz::require_auth))
        .with_state(ApiState { service });

    Router::new().route("/health", get(health_handler)).merge(authenticated)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_account_handler(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<CreateAccountRequest>,
) -> Result<Json<Account>, ApiError> {
    require_permission(&user, "account:create").map_err(ApiError::from_authz)?;
    state.service.create_account(body).await.map(Json).map_err(ApiError::from)
}

async fn list_accounts_handler(State(state): State<ApiState>) -> Result<Json<Vec<Account>>, ApiError> {
    state.service.list_accounts().await.map(Json).map_err(ApiError::from)
}

async fn post_transaction_handler(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<PostTransactionRequest>,
) -> Result<Json<Transaction>, ApiError> {
    require_permission(&user, "transaction:create").map_err(ApiError::from_authz)?;
    state.service.post_transaction(body).await.map(Json).map_err(ApiError::from)
}

async fn get_transaction_handler(
    State(state): State<ApiState>,
    Path(id): Path<TransactionId>,
) -> Result<Json<Transaction>, ApiError> {
    state.service.get_transaction(&id).await.map(Json).map_err(ApiError::from)
}

async fn list_transactions_handler(
    State(state): State<ApiState>,
    Query(filter): Query<TransactionFilter>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    state.service.list_transactions(filter).await.map(Json).map_err(ApiError::from)
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    #[serde(default)]
    from: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    to: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    account_id: Option<String>,
}

async fn report_handler(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = state.service.snapshot().await.map_err(ApiError::from)?;
    let as_of = query.to.unwrap_or_else(Utc::now);
    let from = query.from.unwrap_or_else(|| as_of - chrono::Duration::days(30));

    let body = match kind.as_str() {
        "trial-balance" => serde_json::to_value(erp_ledger_reports::trial_balance(&snapshot, as_of)),
        "balance-sheet" => serde_json::to_value(erp_ledger_reports::balance_sheet(&snapshot, as_of)),
        "income-statement" => serde_json::to_value(erp_ledger_reports::income_statement(&snapshot, from, as_of)),
        "cash-flow" => serde_json::to_value(erp_ledger_reports::cash_flow(&snapshot, from, as_of)),
        "general-ledger" => {
            let account_id = query
                .account_id
                .ok_or_else(|| ApiError::from(LedgerError::Validation("general-ledger report requires account_id".into())))?;
            serde_json::to_value(erp_ledger_reports::general_ledger(&snapshot, &account_id, Some(from), Some(as_of)))
        }
        "dashboard" => {
            let trial = erp_ledger_reports::trial_balance(&snapshot, as_of);
            let balance = erp_ledger_reports::balance_sheet(&snapshot, as_of);
            let income = erp_ledger_reports::income_statement(&snapshot, from, as_of);
            serde_json::to_value(serde_json::json!({
                "trial_balance": trial,
                "balance_sheet": balance,
                "income_statement": income,
            }))
        }
        other => return Err(ApiError::from(LedgerError::Validation(format!("unknown report kind '{other}'")))),
    };
    body.map(Json).map_err(|error| ApiError::from(LedgerError::Internal(error.to_string())))
}

async fn create_period_handler(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<CreatePeriodRequest>,
) -> Result<Json<Period>, ApiError> {
    require_permission(&user, "financial:admin").map_err(ApiError::from_authz)?;
    state.service.create_period(body).await.map(Json).map_err(ApiError::from)
}

async fn list_periods_handler(State(state): State<ApiState>) -> Result<Json<Vec<Period>>, ApiError> {
    state.service.list_periods().await.map(Json).map_err(ApiError::from)
}

async fn close_period_handler(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<PeriodId>,
) -> Result<Json<Period>, ApiError> {
    require_permission(&user, "financial:admin").map_err(ApiError::from_authz)?;
    state.service.close_period(&id, user.id.clone()).await.map(Json).map_err(ApiError::from)
}

async fn lock_period_handler(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<PeriodId>,
) -> Result<Json<Period>, ApiError> {
    require_permission(&user, "financial:admin").map_err(ApiError::from_authz)?;
    state.service.lock_period(&id, user.id.clone()).await.map(Json).map_err(ApiError::from)
}

async fn reopen_period_handler(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<PeriodId>,
) -> Result<Json<Period>, ApiError> {
    require_permission(&user, "financial:admin").map_err(ApiError::from_authz)?;
    state.service.reopen_period(&id, user.id.clone()).await.map(Json).map_err(ApiError::from)
}

#[derive(Debug)]
enum ApiErrorKind {
    Ledger(LedgerError),
    Authz(erp_authz::AuthzError),
}

#[derive(Debug)]
struct ApiError(ApiErrorKind);

impl ApiError {
    fn from_authz(error: erp_authz::AuthzError) -> Self {
        ApiError(ApiErrorKind::Authz(error))
    }
}

impl From<LedgerError> for ApiError {
    fn from(error: LedgerError) -> Self {
        ApiError(ApiErrorKind::Ledger(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            ApiErrorKind::Authz(error) => error.into_response(),
            ApiErrorKind::Ledger(error) => {
                let status = match error {
                    LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                    LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
                    LedgerError::StateConflict(_) => StatusCode::CONFLICT,
                    LedgerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, Json(serde_json::json!({ "detail": error.to_string() }))).into_response()
            }
        }
    }
}
