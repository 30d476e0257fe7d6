use super::{AuthTokens, RefreshToken};
use crate::domain_model::*;
use crate::domain_port::RefreshStoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email already in use")]
    Conflict,
    #[error("refresh token missing")]
    MissingSession,
    #[error("session invalid or expired")]
    InvalidSession,
    #[error("token invalid")]
    TokenInvalid,
    #[error("token expired")]
    TokenExpired,
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RefreshStoreError> for AuthError {
    fn from(err: RefreshStoreError) -> Self {
        match err {
            RefreshStoreError::Collision => {
                AuthError::Internal("refresh token digest collision".to_string())
            }
            RefreshStoreError::Store(e) => AuthError::Store(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub nickname: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user_id: UserId,
    pub tokens: AuthTokens,
}

/// The four operations behind `/api/auth`.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn register(&self, input: RegisterInput) -> Result<UserId, AuthError>;
    async fn login(&self, input: LoginInput) -> Result<LoginResult, AuthError>;
    /// Revokes the presented refresh token if there is one. Never fails.
    async fn logout(&self, refresh_token: Option<RefreshToken>);
    async fn refresh(&self, refresh_token: Option<RefreshToken>)
    -> Result<AuthTokens, AuthError>;
}
