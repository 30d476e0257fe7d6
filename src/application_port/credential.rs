use super::AuthError;
use crate::domain_model::UserId;

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, AuthError>;
}

/// Checks an email/password pair. Unknown users and wrong passwords both
/// yield `InvalidCredentials` after the same amount of hashing work.
#[async_trait::async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, email: &str, password: &str) -> Result<UserId, AuthError>;
}
