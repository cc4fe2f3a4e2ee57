#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::Extension;
use axum::extract::Request;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

const PROFILE_TIMEOUT: Duration = Duration::from_secs(5);

/// The minimal user projection peers need to gate a request; mirrors the
/// body returned by Auth's `/profile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub username: String,
    pub role: String,
    pub permissions: Vec<String>,
    pub is_active: bool,
    pub is_superuser: bool,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_superuser || self.permissions.iter().any(|p| p == permission)
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.is_superuser || self.role == role
    }
}

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("User account is inactive")]
    InactiveUser,
    #[error("Auth service unavailable")]
    Unavailable,
    #[error("missing permission: {0}")]
    MissingPermission(String),
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthzError::InvalidToken | AuthzError::InactiveUser => StatusCode::UNAUTHORIZED,
            AuthzError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthzError::MissingPermission(_) => StatusCode::FORBIDDEN,
        };
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Calls Auth's `GET /profile` with the caller's bearer token. This is the
/// only client peers need; the outcome maps directly onto the middleware's
/// response table.
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuthClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(PROFILE_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub async fn verify(&self, bearer_token: &str) -> Result<AuthenticatedUser, AuthzError> {
        let response = self
            .http
            .get(format!("{}/api/v1/auth/profile", self.base_url))
            .bearer_auth(bearer_token)
            .send()
            .await
            .map_err(|_| AuthzError::Unavailable)?;

        if response.status().is_client_error() {
            return Err(AuthzError::InvalidToken);
        }
        if !response.status().is_success() {
            return Err(AuthzError::Unavailable);
        }

        let user: AuthenticatedUser = response.json().await.map_err(|_| AuthzError::Unavailable)?;
        if !user.is_active {
            return Err(AuthzError::InactiveUser);
        }
        Ok(user)
    }
}

fn extract_bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// `axum::middleware::from_fn_with_state` entry point. Attaches an
/// [`AuthenticatedUser`] to the request extensions on success.
pub async fn require_auth(
    State(client): State<Arc<AuthClient>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer(&request) else {
        return AuthzError::InvalidToken.into_response();
    };

    match client.verify(token).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// Called from a handler after extracting `Extension<AuthenticatedUser>` to
/// gate on a specific permission. Superusers always pass.
pub fn require_permission(user: &AuthenticatedUser, permission: &str) -> Result<(), AuthzError> {
    if user.has_permission(permission) {
        Ok(())
    } else {
        Err(AuthzError::MissingPermission(permission.to_string()))
    }
}

pub fn require_role(user: &AuthenticatedUser, role: &str) -> Result<(), AuthzError> {
    if user.has_role(role) {
        Ok(())
    } else {
        Err(AuthzError::MissingPermission(format!("role:{role}")))
    }
}

pub type CurrentUser = Extension<AuthenticatedUser>;

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    fn active_user() -> AuthenticatedUser {
        AuthenticatedUser {
            id: "user-1".into(),
            username: "cashier1".into(),
            role: "cashier".into(),
            permissions: vec!["transaction:create".into()],
            is_active: true,
            is_superuser: false,
        }
    }

    #[tokio::test]
    async fn active_profile_verifies_successfully() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/profile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(active_user()))
            .mount(&server)
            .await;

        let client = AuthClient::new(server.uri());
        let user = client.verify("token").await.expect("verify");
        assert_eq!(user.username, "cashier1");
    }

    #[tokio::test]
    async fn inactive_user_is_rejected() {
        let server = MockServer::start().await;
        let mut user = active_user();
        user.is_active = false;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/profile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user))
            .mount(&server)
            .await;

        let client = AuthClient::new(server.uri());
        let err = client.verify("token").await.unwrap_err();
        assert!(matches!(err, AuthzError::InactiveUser));
    }

    #[tokio::test]
    async fn auth_4xx_maps_to_invalid_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/profile"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = AuthClient::new(server.uri());
        let err = client.verify("token").await.unwrap_err();
        assert!(matches!(err, AuthzError::InvalidToken));
    }

    #[test]
    fn permission_gate_allows_superuser_regardless_of_grants() {
        let mut user = active_user();
        user.is_superuser = true;
        user.permissions.clear();
        assert!(require_permission(&user, "user:delete").is_ok());
    }

    #[test]
    fn permission_gate_rejects_missing_permission() {
        let user = active_user();
        assert!(require_permission(&user, "user:delete").is_err());
    }
}
