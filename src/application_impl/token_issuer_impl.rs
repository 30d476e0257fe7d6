use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use chrono::{DateTime, Utc};
use hmac::{Hmac, KeyInit, Mac};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

/// Attempts at minting a refresh token whose digest is not already live.
const MINT_ATTEMPTS: usize = 3;
/// 43 characters from a 64-symbol alphabet, just over 256 bits.
const REFRESH_TOKEN_LEN: usize = 43;

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub ttl: Duration,
    pub digest_key: Vec<u8>,
    pub reuse_policy: ReusePolicy,
}

pub struct RealTokenIssuer {
    token_codec: Arc<dyn TokenCodec>,
    refresh_store: Arc<dyn RefreshStore>,
    cfg: RefreshConfig,
}

impl RealTokenIssuer {
    pub fn new(
        token_codec: Arc<dyn TokenCodec>,
        refresh_store: Arc<dyn RefreshStore>,
        cfg: RefreshConfig,
    ) -> Self {
        Self {
            token_codec,
            refresh_store,
            cfg,
        }
    }

    #[inline]
    fn new_refresh_token() -> RefreshToken {
        RefreshToken(nanoid::nanoid!(REFRESH_TOKEN_LEN))
    }

    fn digest(&self, token: &RefreshToken) -> Result<TokenDigest, AuthError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.cfg.digest_key)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        mac.update(token.0.as_bytes());
        Ok(TokenDigest(hex::encode(mac.finalize().into_bytes())))
    }

    fn new_record(
        &self,
        digest: TokenDigest,
        user_id: UserId,
        family_id: FamilyId,
    ) -> RefreshRecord {
        RefreshRecord {
            digest,
            user_id,
            family_id,
            expires_at: Utc::now() + self.cfg.ttl,
            state: RefreshState::Active,
        }
    }

    async fn finish(
        &self,
        user_id: UserId,
        family_id: FamilyId,
        refresh_token: RefreshToken,
        refresh_token_expires_at: DateTime<Utc>,
    ) -> Result<AuthTokens, AuthError> {
        let (access_token, access_token_expires_at) =
            self.token_codec.issue_access_token(user_id).await?;
        Ok(AuthTokens {
            user_id,
            family_id,
            access_token,
            refresh_token,
            access_token_expires_at,
            refresh_token_expires_at,
        })
    }

    async fn on_reuse(&self, record: &RefreshRecord) -> Result<(), AuthError> {
        let revoked = match self.cfg.reuse_policy {
            ReusePolicy::RevokeUser => {
                self.refresh_store
                    .delete_all_for_user(record.user_id)
                    .await?
            }
            ReusePolicy::RevokeFamily => {
                self.refresh_store
                    .delete_family(record.user_id, record.family_id)
                    .await?
            }
            ReusePolicy::RejectOnly => 0,
        };
        warn!(
            user_id = %record.user_id,
            family_id = %record.family_id,
            policy = ?self.cfg.reuse_policy,
            revoked,
            "rotated-out refresh token presented again"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl TokenIssuer for RealTokenIssuer {
    async fn issue(&self, user: UserId) -> Result<AuthTokens, AuthError> {
        let family_id = FamilyId::new_random();

        for attempt in 1..=MINT_ATTEMPTS {
            let refresh_token = Self::new_refresh_token();
            let record = self.new_record(self.digest(&refresh_token)?, user, family_id);
            let expires_at = record.expires_at;

            match self.refresh_store.put(record).await {
                Ok(()) => {
                    debug!(user_id = %user, family_id = %family_id, "session started");
                    return self.finish(user, family_id, refresh_token, expires_at).await;
                }
                Err(RefreshStoreError::Collision) => {
                    warn!(attempt, "refresh token digest collision, minting again");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AuthError::Internal(
            "could not mint a unique refresh token".to_string(),
        ))
    }

    async fn rotate(&self, refresh_token: &RefreshToken) -> Result<AuthTokens, AuthError> {
        let digest = self.digest(refresh_token)?;

        let current = self
            .refresh_store
            .get(&digest)
            .await?
            .ok_or(AuthError::InvalidSession)?;
        if current.state == RefreshState::Rotated {
            self.on_reuse(&current).await?;
            return Err(AuthError::InvalidSession);
        }

        for attempt in 1..=MINT_ATTEMPTS {
            let next_token = Self::new_refresh_token();
            let record =
                self.new_record(self.digest(&next_token)?, current.user_id, current.family_id);
            let expires_at = record.expires_at;

            match self.refresh_store.rotate(&digest, record).await {
                Ok(RotateOutcome::Rotated) => {
                    debug!(
                        user_id = %current.user_id,
                        family_id = %current.family_id,
                        "session rotated"
                    );
                    return self
                        .finish(current.user_id, current.family_id, next_token, expires_at)
                        .await;
                }
                // Lost a race against a concurrent rotation of the same token.
                Ok(RotateOutcome::Reused(record)) => {
                    self.on_reuse(&record).await?;
                    return Err(AuthError::InvalidSession);
                }
                Ok(RotateOutcome::NotFound) => return Err(AuthError::InvalidSession),
                Err(RefreshStoreError::Collision) => {
                    warn!(attempt, "refresh token digest collision, minting again");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AuthError::Internal(
            "could not mint a unique refresh token".to_string(),
        ))
    }

    async fn revoke(&self, refresh_token: &RefreshToken) -> Result<(), AuthError> {
        let digest = self.digest(refresh_token)?;
        self.refresh_store.delete(&digest).await?;
        Ok(())
    }
}
