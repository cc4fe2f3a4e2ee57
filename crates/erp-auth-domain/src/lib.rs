#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

mod memory;
mod passwords;
mod tokens;

pub use memory::InMemoryAuthService;
pub use passwords::hash_password;
pub use passwords::validate_password_strength;
pub use passwords::verify_password;
pub use tokens::Claims;
pub use tokens::TokenSigner;
pub use tokens::TokenType;

pub type UserId = String;
pub type RoleId = String;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),
    #[error("missing permission: {0}")]
    AuthorizationFailure(String),
    #[error("state conflict: {0}")]
    StateConflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub role_id: RoleId,
    pub direct_permissions: Vec<String>,
}

impl User {
    /// Effective permissions are the user's direct grants unioned with the
    /// permissions carried by their role.
    #[must_use]
    pub fn effective_permissions(&self, role: &Role) -> HashSet<String> {
        let mut set: HashSet<String> = self.direct_permissions.iter().cloned().collect();
        set.extend(role.permissions.iter().cloned());
        set
    }

    #[must_use]
    pub fn has_permission(&self, role: &Role, permission: &str) -> bool {
        self.is_superuser || self.effective_permissions(role).contains(permission)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSession {
    pub id: String,
    pub user_id: UserId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub device: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProjection {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub permissions: Vec<String>,
    pub is_active: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub user: UserProjection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub role_name: String,
    pub direct_permissions: Vec<String>,
}

impl CreateUserRequest {
    pub fn normalize(mut self) -> AuthResult<Self> {
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_ascii_lowercase();
        self.full_name = self.full_name.trim().to_string();

        if self.username.is_empty() {
            return Err(AuthError::Validation("username cannot be empty".into()));
        }
        if !self.email.contains('@') {
            return Err(AuthError::Validation("email must include '@'".into()));
        }
        if self.full_name.is_empty() {
            return Err(AuthError::Validation("full name cannot be empty".into()));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
}

/// Standard roles seeded at bootstrap, grounded on the `resource:action`
/// permission naming convention; resources are `account`, `transaction`,
/// `user`, `financial` and actions are `create`, `read`, `update`, `delete`,
/// `list`, `admin`.
#[must_use]
pub fn default_roles() -> Vec<Role> {
    let resources = ["account", "transaction", "user", "financial"];
    let all_actions = |resources: &[&str], actions: &[&str]| -> Vec<String> {
        resources
            .iter()
            .flat_map(|resource| actions.iter().map(move |action| format!("{resource}:{action}")))
            .collect()
    };

    vec![
        Role {
            id: "role-admin".into(),
            name: "admin".into(),
            description: Some("Full administrative access".into()),
            permissions: all_actions(
                &resources,
                &["create", "read", "update", "delete", "list", "admin"],
            ),
        },
        Role {
            id: "role-manager".into(),
            name: "manager".into(),
            description: Some("Sale voids/refunds and read-level oversight".into()),
            permissions: all_actions(&resources, &["read", "list"]),
        },
        Role {
            id: "role-cashier".into(),
            name: "cashier".into(),
            description: Some("Point-of-sale operator".into()),
            permissions: vec!["transaction:create".into(), "account:read".into()],
        },
        Role {
            id: "role-auditor".into(),
            name: "auditor".into(),
            description: Some("Read-only financial oversight".into()),
            permissions: all_actions(&["account", "transaction", "financial"], &["read", "list"]),
        },
    ]
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, identity: &str, password: &str) -> AuthResult<TokenBundle>;
    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenBundle>;
    async fn logout(&self, refresh_token: &str) -> AuthResult<()>;
    async fn profile(&self, access_token: &str) -> AuthResult<UserProjection>;
    async fn change_password(
        &self,
        access_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()>;
    async fn create_user(&self, request: CreateUserRequest) -> AuthResult<User>;
    async fn list_users(&self) -> AuthResult<Vec<User>>;
    async fn set_user_role(&self, user_id: &UserId, role_name: &str) -> AuthResult<User>;
    /// Deactivates a user. Rejects deactivating `actor_id` itself.
    async fn deactivate_user(&self, user_id: &UserId, actor_id: &UserId) -> AuthResult<User>;
    async fn activate_user(&self, user_id: &UserId) -> AuthResult<User>;
    /// Creates the configured superuser if, and only if, none exists yet.
    /// Returns whether a user was created.
    async fn bootstrap(&self, admin: BootstrapAdmin) -> AuthResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_permissions_union_direct_and_role() {
        let role = Role {
            id: "role-cashier".into(),
            name: "cashier".into(),
            description: None,
            permissions: vec!["transaction:create".into()],
        };
        let user = User {
            id: "user-1".into(),
            username: "cashier1".into(),
            email: "c@example.com".into(),
            full_name: "Cashier One".into(),
            password_hash: "hash".into(),
            is_active: true,
            is_superuser: false,
            last_login: None,
            created_at: Utc::now(),
            role_id: role.id.clone(),
            direct_permissions: vec!["account:read".into()],
        };

        let effective = user.effective_permissions(&role);
        assert!(effective.contains("transaction:create"));
        assert!(effective.contains("account:read"));
        assert!(user.has_permission(&role, "account:read"));
        assert!(!user.has_permission(&role, "user:delete"));
    }

    #[test]
    fn superuser_bypasses_permission_checks() {
        let role = Role {
            id: "role-cashier".into(),
            name: "cashier".into(),
            description: None,
            permissions: vec![],
        };
        let user = User {
            id: "user-1".into(),
            username: "root".into(),
            email: "root@example.com".into(),
            full_name: "Root".into(),
            password_hash: "hash".into(),
            is_active: true,
            is_superuser: true,
            last_login: None,
            created_at: Utc::now(),
            role_id: role.id.clone(),
            direct_permissions: vec![],
        };

        assert!(user.has_permission(&role, "user:delete"));
    }

    #[test]
    fn create_user_request_normalizes_email_case() {
        let request = CreateUserRequest {
            username: "  alice  ".into(),
            email: " ALICE@example.com ".into(),
            full_name: "  Alice  ".into(),
            password: "Str0ngPassw0rd".into(),
            role_name: "cashier".into(),
            direct_permissions: vec![],
        }
        .normalize()
        .expect("normalize");

        assert_eq!(request.username, "alice");
        assert_eq!(request.email, "alice@example.com");
        assert_eq!(request.full_name, "Alice");
    }
}
