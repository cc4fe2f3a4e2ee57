use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use chrono::Utc;
use erp_audit_log::AppendRequest;
use erp_audit_log::AuditLog;
use sha2::Digest;
use sha2::Sha256;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::AuthError;
use crate::AuthResult;
use crate::AuthService;
use crate::BootstrapAdmin;
use crate::CreateUserRequest;
use crate::RefreshSession;
use crate::Role;
use crate::RoleId;
use crate::TokenBundle;
use crate::TokenSigner;
use crate::TokenType;
use crate::User;
use crate::UserId;
use crate::UserProjection;
use crate::default_roles;
use crate::hash_password;
use crate::verify_password;

pub struct InMemoryAuthService {
    signer: TokenSigner,
    state: Mutex<State>,
    audit: Arc<dyn AuditLog>,
}

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    roles: HashMap<RoleId, Role>,
    refresh_sessions: HashMap<String, RefreshSession>,
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl State {
    fn role_by_name(&self, name: &str) -> Option<&Role> {
        self.roles.values().find(|role| role.name == name)
    }

    fn user_by_identity(&self, identity: &str) -> Option<&User> {
        self.users
            .values()
            .find(|user| user.username == identity || user.email == identity)
    }

    fn user_by_username_or_email(&self, username: &str, email: &str) -> Option<&User> {
        self.users
            .values()
            .find(|user| user.username == username || user.email == email)
    }

    fn projection(&self, user: &User) -> AuthResult<UserProjection> {
        let role = self
            .roles
            .get(&user.role_id)
            .ok_or_else(|| AuthError::Internal(format!("role {} missing", user.role_id)))?;
        let mut permissions: Vec<String> = user.effective_permissions(role).into_iter().collect();
        permissions.sort();
        Ok(UserProjection {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: role.name.clone(),
            permissions,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
        })
    }
}

impl InMemoryAuthService {
    #[must_use]
    pub fn new(
        secret: impl Into<Vec<u8>>,
        access_ttl: Duration,
        refresh_ttl: Duration,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        let roles = default_roles()
            .into_iter()
            .map(|role| (role.id.clone(), role))
            .collect();
        Self {
            signer: TokenSigner::new(secret, access_ttl, refresh_ttl),
            state: Mutex::new(State {
                users: HashMap::new(),
                roles,
                refresh_sessions: HashMap::new(),
            }),
            audit,
        }
    }

    /// Best-effort audit append: a failure here must never fail the
    /// operation it is recording, only be logged.
    async fn record(&self, entity_id: &str, actor: &str, action: &str) {
        let result = self
            .audit
            .append(AppendRequest {
                entity_id: entity_id.to_string(),
                actor: actor.to_string(),
                action: action.to_string(),
                metadata: serde_json::Value::Null,
            })
            .await;
        if let Err(error) = result {
            tracing::error!(%error, entity_id, action, "failed to append audit record");
        }
    }

    async fn issue_bundle(&self, state: &mut State, user: &User) -> AuthResult<TokenBundle> {
        let projection = state.projection(user)?;
        let access_token = self.signer.issue(
            &user.id,
            &user.username,
            &projection.role,
            &projection.permissions,
            TokenType::Access,
        )?;
        let refresh_token = self.signer.issue(
            &user.id,
            &user.username,
            &projection.role,
            &projection.permissions,
            TokenType::Refresh,
        )?;

        let session = RefreshSession {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            token_hash: hash_token(&refresh_token),
            expires_at: Utc::now() + self.signer_refresh_ttl(),
            active: true,
            created_at: Utc::now(),
            device: None,
            user_agent: None,
            ip: None,
        };
        state
            .refresh_sessions
            .insert(session.token_hash.clone(), session);

        Ok(TokenBundle {
            access_token,
            refresh_token,
            token_type: "bearer",
            user: projection,
        })
    }

    fn signer_refresh_ttl(&self) -> Duration {
        // Sessions must outlive the refresh token they wrap so a session
        // near its own expiry is never mistaken for stale state.
        Duration::days(30)
    }
}

#[async_trait]
impl AuthService for InMemoryAuthService {
    async fn login(&self, identity: &str, password: &str) -> AuthResult<TokenBundle> {
        let mut state = self.state.lock().await;

        let user_id = {
            let user = state
                .user_by_identity(identity)
                .ok_or_else(|| AuthError::AuthenticationFailure("invalid credentials".into()))?;
            if !user.is_active {
                return Err(AuthError::AuthenticationFailure(
                    "invalid credentials".into(),
                ));
            }
            if !verify_password(password, &user.password_hash) {
                return Err(AuthError::AuthenticationFailure(
                    "invalid credentials".into(),
                ));
            }
            user.id.clone()
        };

        let bundle = {
            let user = state
                .users
                .get(&user_id)
                .ok_or_else(|| AuthError::Internal("user vanished mid-login".into()))?
                .clone();
            self.issue_bundle(&mut state, &user).await?
        };

        if let Some(user) = state.users.get_mut(&user_id) {
            user.last_login = Some(Utc::now());
        }
        drop(state);

        self.record(&user_id, &user_id, "login").await;
        Ok(bundle)
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenBundle> {
        let claims = self.signer.verify(refresh_token, TokenType::Refresh)?;
        let mut state = self.state.lock().await;

        let hash = hash_token(refresh_token);
        let session = state
            .refresh_sessions
            .get(&hash)
            .cloned()
            .ok_or_else(|| AuthError::AuthenticationFailure("invalid or expired token".into()))?;

        if !session.active || session.expires_at < Utc::now() {
            return Err(AuthError::AuthenticationFailure(
                "invalid or expired token".into(),
            ));
        }

        let user = state
            .users
            .get(&claims.sub)
            .cloned()
            .ok_or_else(|| AuthError::NotFound(format!("user {}", claims.sub)))?;
        if !user.is_active {
            return Err(AuthError::AuthenticationFailure(
                "invalid or expired token".into(),
            ));
        }

        if let Some(existing) = state.refresh_sessions.get_mut(&hash) {
            existing.active = false;
        }

        self.issue_bundle(&mut state, &user).await
    }

    async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        let mut state = self.state.lock().await;
        let hash = hash_token(refresh_token);
        match state.refresh_sessions.get_mut(&hash) {
            Some(session) => {
                session.active = false;
                Ok(())
            }
            None => Err(AuthError::NotFound("refresh session".into())),
        }
    }

    async fn profile(&self, access_token: &str) -> AuthResult<UserProjection> {
        let claims = self.signer.verify(access_token, TokenType::Access)?;
        let state = self.state.lock().await;
        let user = state
            .users
            .get(&claims.sub)
            .ok_or_else(|| AuthError::NotFound(format!("user {}", claims.sub)))?;
        state.projection(user)
    }

    async fn change_password(
        &self,
        access_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let claims = self.signer.verify(access_token, TokenType::Access)?;
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(&claims.sub)
            .ok_or_else(|| AuthError::NotFound(format!("user {}", claims.sub)))?;

        if !verify_password(current_password, &user.password_hash) {
            return Err(AuthError::AuthenticationFailure(
                "current password is incorrect".into(),
            ));
        }
        user.password_hash = hash_password(new_password)?;
        let user_id = claims.sub.clone();
        drop(state);

        self.record(&user_id, &user_id, "password_changed").await;
        Ok(())
    }

    async fn create_user(&self, request: CreateUserRequest) -> AuthResult<User> {
        let request = request.normalize()?;
        let mut state = self.state.lock().await;

        if state
            .user_by_username_or_email(&request.username, &request.email)
            .is_some()
        {
            return Err(AuthError::StateConflict(
                "username or email already exists".into(),
            ));
        }

        let role_id = state
            .role_by_name(&request.role_name)
            .ok_or_else(|| AuthError::NotFound(format!("role {}", request.role_name)))?
            .id
            .clone();

        let password_hash = hash_password(&request.password)?;
        let user = User {
            id: format!("user-{}", Uuid::new_v4()),
            username: request.username,
            email: request.email,
            full_name: request.full_name,
            password_hash,
            is_active: true,
            is_superuser: false,
            last_login: None,
            created_at: Utc::now(),
            role_id,
            direct_permissions: request.direct_permissions,
        };
        state.users.insert(user.id.clone(), user.clone());
        drop(state);

        self.record(&user.id, "system", "user_created").await;
        Ok(user)
    }

    async fn list_users(&self) -> AuthResult<Vec<User>> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn set_user_role(&self, user_id: &UserId, role_name: &str) -> AuthResult<User> {
        let mut state = self.state.lock().await;
        let role_id = state
            .role_by_name(role_name)
            .ok_or_else(|| AuthError::NotFound(format!("role {role_name}")))?
            .id
            .clone();

        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| AuthError::NotFound(format!("user {user_id}")))?;
        user.role_id = role_id;
        let updated = user.clone();
        drop(state);

        self.record(&updated.id, "system", "role_changed").await;
        Ok(updated)
    }

    async fn deactivate_user(&self, user_id: &UserId, actor_id: &UserId) -> AuthResult<User> {
        if user_id == actor_id {
            return Err(AuthError::Validation("cannot deactivate your own account".into()));
        }
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| AuthError::NotFound(format!("user {user_id}")))?;
        user.is_active = false;
        let updated = user.clone();
        drop(state);

        self.record(&updated.id, "system", "deactivated").await;
        Ok(updated)
    }

    async fn activate_user(&self, user_id: &UserId) -> AuthResult<User> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| AuthError::NotFound(format!("user {user_id}")))?;
        user.is_active = true;
        let updated = user.clone();
        drop(state);

        self.record(&updated.id, "system", "activated").await;
        Ok(updated)
    }

    async fn bootstrap(&self, admin: BootstrapAdmin) -> AuthResult<bool> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|user| user.is_superuser) {
            return Ok(false);
        }

        let role_id = state
            .role_by_name("admin")
            .ok_or_else(|| AuthError::Internal("default admin role missing".into()))?
            .id
            .clone();

        let password_hash = hash_password(&admin.password)?;
        let user = User {
            id: format!("user-{}", Uuid::new_v4()),
            username: admin.username.clone(),
            email: admin.email,
            full_name: admin.full_name,
            password_hash,
            is_active: true,
            is_superuser: true,
            last_login: None,
            created_at: Utc::now(),
            role_id,
            direct_permissions: Vec::new(),
        };
        state.users.insert(user.id.clone(), user);

        tracing::info!(username = %admin.username, "bootstrapped default superuser");
        Ok(true)
    }
}
