use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

pub struct InMemoryUserRepo {
    users: DashMap<Email, User>,
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        InMemoryUserRepo {
            users: DashMap::new(),
        }
    }
}

impl Default for InMemoryUserRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UserRepo for InMemoryUserRepo {
    async fn create(&self, user: &User) -> Result<(), AuthError> {
        match self.users.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(AuthError::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                Ok(())
            }
        }
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, AuthError> {
        Ok(self.users.get(email).map(|entry| entry.value().clone()))
    }

    async fn email_exists(&self, email: &Email) -> Result<bool, AuthError> {
        Ok(self.users.contains_key(email))
    }
}
