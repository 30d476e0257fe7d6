use super::AuthError;
use crate::domain_model::{FamilyId, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct AccessToken(pub String);

#[derive(Clone, Eq, PartialEq, Serialize)]
pub struct RefreshToken(pub String);

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshToken(..)")
    }
}

#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub user_id: UserId,
    pub family_id: FamilyId,
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub user_id: UserId,
    pub jti: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Signs and checks stateless access tokens.
#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    async fn issue_access_token(
        &self,
        user: UserId,
    ) -> Result<(AccessToken, DateTime<Utc>), AuthError>;
    async fn verify_access_token(&self, token: &AccessToken) -> Result<TokenClaims, AuthError>;
}

/// What to do when a rotated-out refresh token shows up again.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ReusePolicy {
    RevokeUser,
    RevokeFamily,
    RejectOnly,
}

impl std::str::FromStr for ReusePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "revoke_user" => Ok(ReusePolicy::RevokeUser),
            "revoke_family" => Ok(ReusePolicy::RevokeFamily),
            "reject_only" => Ok(ReusePolicy::RejectOnly),
            other => Err(format!("unknown reuse policy: {other}")),
        }
    }
}

#[async_trait::async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Starts a new session family for `user`.
    async fn issue(&self, user: UserId) -> Result<AuthTokens, AuthError>;
    /// Exchanges a live refresh token for a new pair. The presented token
    /// stops working as soon as this returns.
    async fn rotate(&self, refresh_token: &RefreshToken) -> Result<AuthTokens, AuthError>;
    async fn revoke(&self, refresh_token: &RefreshToken) -> Result<(), AuthError>;
}
