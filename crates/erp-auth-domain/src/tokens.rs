use chrono::Duration;
use chrono::Utc;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;
use jsonwebtoken::decode;
use jsonwebtoken::encode;
use serde::Deserialize;
use serde::Serialize;

use crate::AuthError;
use crate::AuthResult;
use crate::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub username: String,
    pub role: String,
    pub permissions: Vec<String>,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

/// Signs and verifies HS256 access/refresh tokens. Held by the in-memory
/// service, constructed once from a startup-configured secret.
pub struct TokenSigner {
    secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenSigner {
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue(
        &self,
        user_id: &str,
        username: &str,
        role: &str,
        permissions: &[String],
        token_type: TokenType,
    ) -> AuthResult<String> {
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role: role.to_string(),
            permissions: permissions.to_vec(),
            exp: (Utc::now() + ttl).timestamp(),
            token_type,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|err| AuthError::Internal(format!("token signing failed: {err}")))
    }

    pub fn verify(&self, token: &str, expected: TokenType) -> AuthResult<Claims> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| AuthError::AuthenticationFailure("invalid or expired token".into()))?;

        if data.claims.token_type != expected {
            return Err(AuthError::AuthenticationFailure(
                "token type mismatch".into(),
            ));
        }
        Ok(data.claims)
    }
}
