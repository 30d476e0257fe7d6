use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::UserId;

/// Identifies the chain of refresh tokens that descend from one login.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct FamilyId(pub uuid::Uuid);

impl FamilyId {
    pub fn new_random() -> Self {
        FamilyId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for FamilyId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(FamilyId)
    }
}

/// Keyed digest of a refresh token. The plaintext token is never stored.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TokenDigest(pub String);

impl fmt::Display for TokenDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RefreshState {
    Active,
    /// Replaced by a newer token of the same family. Kept until expiry so
    /// that a second presentation can be recognised as reuse.
    Rotated,
}

impl RefreshState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshState::Active => "active",
            RefreshState::Rotated => "rotated",
        }
    }
}

impl std::str::FromStr for RefreshState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RefreshState::Active),
            "rotated" => Ok(RefreshState::Rotated),
            other => Err(format!("unknown refresh state: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshRecord {
    pub digest: TokenDigest,
    pub user_id: UserId,
    pub family_id: FamilyId,
    pub expires_at: DateTime<Utc>,
    pub state: RefreshState,
}

impl RefreshRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
