use crate::application_port::*;
use crate::domain_model::*;

#[async_trait::async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert a user. Fails with `AuthError::Conflict` if the email is taken,
    /// including when a concurrent insert won the race.
    async fn create(&self, user: &User) -> Result<(), AuthError>;

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, AuthError>;

    async fn email_exists(&self, email: &Email) -> Result<bool, AuthError>;
}
