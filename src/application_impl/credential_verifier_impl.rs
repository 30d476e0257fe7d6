use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use std::sync::Arc;

/// Argon2id cost parameters.
#[derive(Debug, Clone)]
pub struct Argon2Config {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Argon2Config {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Hashing runs on the blocking pool so request tasks are not stalled.
pub struct Argon2PasswordHasher {
    params: Params,
}

impl Argon2PasswordHasher {
    pub fn new(cfg: &Argon2Config) -> Result<Self, AuthError> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| AuthError::Internal(format!("invalid argon2 params: {e}")))?;
        Ok(Self { params })
    }
}

#[async_trait::async_trait]
impl CredentialHasher for Argon2PasswordHasher {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let params = self.params.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AuthError::Internal(e.to_string()))
        })
        .await
        .map_err(|e| AuthError::Internal(format!("hash task failed: {e}")))?
    }

    async fn verify_password(
        &self,
        password: &str,
        password_hash: &str,
    ) -> Result<bool, AuthError> {
        let password = password.to_owned();
        let password_hash = password_hash.to_owned();
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&password_hash)
                .map_err(|e| AuthError::Internal(format!("invalid PHC hash: {e}")))?;

            // Cost parameters come from the PHC string itself.
            match Argon2::default().verify_password(password.as_bytes(), &parsed) {
                Ok(_) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(AuthError::Internal(format!("verify error: {e}"))),
            }
        })
        .await
        .map_err(|e| AuthError::Internal(format!("verify task failed: {e}")))?
    }
}

pub struct RealCredentialVerifier {
    user_repo: Arc<dyn UserRepo>,
    credential_hasher: Arc<dyn CredentialHasher>,
    dummy_hash: String,
}

impl RealCredentialVerifier {
    /// Hashes a throwaway password up front so unknown emails cost the same
    /// as known ones.
    pub async fn new(
        user_repo: Arc<dyn UserRepo>,
        credential_hasher: Arc<dyn CredentialHasher>,
    ) -> Result<Self, AuthError> {
        let dummy_hash = credential_hasher
            .hash_password(&nanoid::nanoid!(32))
            .await?;
        Ok(Self {
            user_repo,
            credential_hasher,
            dummy_hash,
        })
    }
}

#[async_trait::async_trait]
impl CredentialVerifier for RealCredentialVerifier {
    async fn verify(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        let email = Email::normalize(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::BadRequest(
                "Email and password are required.".to_string(),
            ));
        }

        let user = self.user_repo.find_by_email(&email).await?;
        let (user_id, password_hash) = match &user {
            Some(user) => (Some(user.user_id), user.password_hash.as_str()),
            None => (None, self.dummy_hash.as_str()),
        };

        let matches = self
            .credential_hasher
            .verify_password(password, password_hash)
            .await?;

        match (matches, user_id) {
            (true, Some(user_id)) => Ok(user_id),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}
