#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use chrono::Duration;
use erp_audit_log::InMemoryAuditLog;
use erp_auth_domain::AuthError;
use erp_auth_domain::AuthResult;
use erp_auth_domain::AuthService;
use erp_auth_domain::BootstrapAdmin;
use erp_auth_domain::CreateUserRequest;
use erp_auth_domain::InMemoryAuthService;
use erp_auth_domain::TokenBundle;
use erp_auth_domain::UserId;
use erp_auth_domain::UserProjection;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::Instrument;
use tracing::info_span;

struct Config {
    bind_addr: SocketAddr,
    secret_key: String,
    access_token_expire_minutes: i64,
    refresh_token_expire_days: i64,
    enable_default_admin: bool,
    default_admin_email: String,
    default_admin_name: String,
    default_admin_password: String,
}

impl Config {
    fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("AUTH_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8001".to_string())
                .parse()
                .expect("AUTH_BIND_ADDR must be a valid socket address"),
            secret_key: std::env::var("SECRET_KEY")
                .unwrap_or_else(|_| "your-super-secret-key-change-this-in-production".to_string()),
            access_token_expire_minutes: std::env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            refresh_token_expire_days: std::env::var("REFRESH_TOKEN_EXPIRE_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7),
            enable_default_admin: std::env::var("ENABLE_DEFAULT_ADMIN")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
            default_admin_email: std::env::var("DEFAULT_ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@example.com".to_string()),
            default_admin_name: std::env::var("DEFAULT_ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string()),
            default_admin_password: std::env::var("DEFAULT_ADMIN_PASSWORD").unwrap_or_else(|_| "admin12345".to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,auth_service=debug".parse().unwrap()),
        )
        .init();

    let config = Config::from_env();
    let service: Arc<dyn AuthService> = Arc::new(InMemoryAuthService::new(
        config.secret_key.clone().into_bytes(),
        Duration::minutes(config.access_token_expire_minutes),
        Duration::days(config.refresh_token_expire_days),
        InMemoryAuditLog::shared(),
    ));

    if config.enable_default_admin {
        let created = service
            .bootstrap(BootstrapAdmin {
                username: "admin".to_string(),
                email: config.default_admin_email.clone(),
                full_name: config.default_admin_name.clone(),
                password: config.default_admin_password.clone(),
            })
            .await?;
        if created {
            tracing::info!(email = %config.default_admin_email, "bootstrapped default superuser");
        }
    }

    let app = router(service);
    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "auth-service listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Clone)]
struct ApiState {
    service: Arc<dyn AuthService>,
}

fn router(service: Arc<dyn AuthService>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/auth/login", post(login_handler))
        .route("/api/v1/auth/refresh", post(refresh_handler))
        .route("/api/v1/auth/logout", post(logout_handler))
        .route("/api/v1/auth/profile", get(profile_handler))
        .route("/api/v1/auth/change-password", post(change_password_handler))
        .route("/api/v1/auth/users", get(list_users_handler))
        .route("/api/v1/auth/register", post(register_handler))
        .route("/api/v1/auth/users/{id}/role", put(set_role_handler))
        .route("/api/v1/auth/users/{id}/deactivate", put(deactivate_user_handler))
        .route("/api/v1/auth/users/{id}/activate", put(activate_user_handler))
        .with_state(ApiState { service })
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(alias = "username", alias = "email")]
    identity: String,
    password: String,
}

async fn login_handler(
    State(state): State<ApiState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<TokenBundle>, ApiError> {
    let span = info_span!("login", identity = %body.identity);
    state
        .service
        .login(&body.identity, &body.password)
        .instrument(span)
        .await
        .map(Json)
        .map_err(ApiError)
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

async fn refresh_handler(
    State(state): State<ApiState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenBundle>, ApiError> {
    state.service.refresh(&body.refresh_token).await.map(Json).map_err(ApiError)
}

async fn logout_handler(State(state): State<ApiState>, Json(body): Json<RefreshRequest>) -> Result<StatusCode, ApiError> {
    state.service.logout(&body.refresh_token).await.map_err(ApiError)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn profile_handler(State(state): State<ApiState>, headers: HeaderMap) -> Result<Json<UserProjection>, ApiError> {
    let token = bearer_token(&headers)?;
    state.service.profile(token).await.map(Json).map_err(ApiError)
}

#[derive(Debug, Deserialize)]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

async fn change_password_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers)?;
    state
        .service
        .change_password(token, &body.current_password, &body.new_password)
        .await
        .map_err(ApiError)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_users_handler(State(state): State<ApiState>, headers: HeaderMap) -> Result<Json<Vec<UserSummary>>, ApiError> {
    require_admin(&state, &headers).await?;
    let users = state.service.list_users().await.map_err(ApiError)?;
    Ok(Json(users.into_iter().map(UserSummary::from).collect()))
}

async fn register_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<CreateUserRequest>,
) -> Result<Json<UserSummary>, ApiError> {
    require_admin(&state, &headers).await?;
    let user = state.service.create_user(body).await.map_err(ApiError)?;
    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
struct SetRoleRequest {
    role_name: String,
}

async fn set_role_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<UserId>,
    Json(body): Json<SetRoleRequest>,
) -> Result<Json<UserSummary>, ApiError> {
    require_admin(&state, &headers).await?;
    let user = state.service.set_user_role(&id, &body.role_name).await.map_err(ApiError)?;
    Ok(Json(user.into()))
}

async fn deactivate_user_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<UserId>,
) -> Result<Json<UserSummary>, ApiError> {
    let actor = require_admin(&state, &headers).await?;
    let user = state.service.deactivate_user(&id, &actor.id).await.map_err(ApiError)?;
    Ok(Json(user.into()))
}

async fn activate_user_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<UserId>,
) -> Result<Json<UserSummary>, ApiError> {
    require_admin(&state, &headers).await?;
    let user = state.service.activate_user(&id).await.map_err(ApiError)?;
    Ok(Json(user.into()))
}

/// User CRUD admin routes authenticate through the same `profile` call the
/// rest of the fleet uses against this service, rather than a second code
/// path: Auth is its own client here.
async fn require_admin(state: &ApiState, headers: &HeaderMap) -> AuthResult<UserProjection> {
    let token = bearer_token(headers).map_err(|_| AuthError::AuthenticationFailure("missing bearer token".into()))?;
    let profile = state.service.profile(token).await?;
    if profile.is_superuser || profile.role == "admin" {
        Ok(profile)
    } else {
        Err(AuthError::AuthorizationFailure("admin role required".into()))
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError(AuthError::AuthenticationFailure("missing bearer token".into())))
}

/// A `User` without its `password_hash`, the shape admin CRUD endpoints
/// return; the raw domain type never crosses the wire.
#[derive(Debug, Serialize)]
struct UserSummary {
    id: UserId,
    username: String,
    email: String,
    full_name: String,
    is_active: bool,
    is_superuser: bool,
    role_id: String,
}

impl From<erp_auth_domain::User> for UserSummary {
    fn from(user: erp_auth_domain::User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            role_id: user.role_id,
        }
    }
}

#[derive(Debug)]
struct ApiError(AuthError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::AuthenticationFailure(_) => StatusCode::UNAUTHORIZED,
            AuthError::AuthorizationFailure(_) => StatusCode::FORBIDDEN,
            AuthError::StateConflict(_) => StatusCode::CONFLICT,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "detail": self.0.to_string() }))).into_response()
    }
}
