use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use chrono::Utc;
use std::sync::Arc;

pub struct RealAuthService {
    user_repo: Arc<dyn UserRepo>,
    credential_hasher: Arc<dyn CredentialHasher>,
    credential_verifier: Arc<dyn CredentialVerifier>,
    token_issuer: Arc<dyn TokenIssuer>,
}

impl RealAuthService {
    pub fn new(
        user_repo: Arc<dyn UserRepo>,
        credential_hasher: Arc<dyn CredentialHasher>,
        credential_verifier: Arc<dyn CredentialVerifier>,
        token_issuer: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            user_repo,
            credential_hasher,
            credential_verifier,
            token_issuer,
        }
    }

    fn validate_register(nickname: &str, email: &Email, password: &str) -> Result<(), AuthError> {
        if nickname.trim().is_empty() || email.is_empty() || password.is_empty() {
            return Err(AuthError::BadRequest(
                "nickname, email, and password are required".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn register(&self, input: RegisterInput) -> Result<UserId, AuthError> {
        let RegisterInput {
            nickname,
            email,
            password,
        } = input;
        let email = Email::normalize(&email);

        Self::validate_register(&nickname, &email, &password)?;

        if self.user_repo.email_exists(&email).await? {
            return Err(AuthError::Conflict);
        }

        let user = User {
            user_id: UserId::new_random(),
            nickname: nickname.trim().to_string(),
            email,
            password_hash: self.credential_hasher.hash_password(&password).await?,
            created_at: Utc::now(),
        };
        // A concurrent registration can still win between the check and
        // here; the repo reports that as a conflict too.
        self.user_repo.create(&user).await?;

        info!(user_id = %user.user_id, "user registered");
        Ok(user.user_id)
    }

    async fn login(&self, input: LoginInput) -> Result<LoginResult, AuthError> {
        let LoginInput { email, password } = input;

        let user_id = match self.credential_verifier.verify(&email, &password).await {
            Ok(user_id) => user_id,
            Err(AuthError::InvalidCredentials) => {
                info!("login rejected");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        let tokens = self.token_issuer.issue(user_id).await?;
        info!(user_id = %user_id, family_id = %tokens.family_id, "user logged in");

        Ok(LoginResult { user_id, tokens })
    }

    async fn logout(&self, refresh_token: Option<RefreshToken>) {
        let Some(refresh_token) = refresh_token else {
            return;
        };
        if let Err(e) = self.token_issuer.revoke(&refresh_token).await {
            warn!("logout could not revoke refresh token: {}", e);
        }
    }

    async fn refresh(&self, refresh_token: Option<RefreshToken>) -> Result<AuthTokens, AuthError> {
        let refresh_token = refresh_token.ok_or(AuthError::MissingSession)?;
        self.token_issuer.rotate(&refresh_token).await
    }
}
