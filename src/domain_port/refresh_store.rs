use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum RefreshStoreError {
    #[error("a live record already uses this digest")]
    Collision,
    #[error("infra error: {0}")]
    Store(String),
}

#[derive(Debug)]
pub enum RotateOutcome {
    /// The old record was active; it is now `Rotated` and the new record is live.
    Rotated,
    /// The old record had already been rotated out.
    Reused(RefreshRecord),
    /// Absent or expired.
    NotFound,
}

#[async_trait::async_trait]
pub trait RefreshStore: Send + Sync {
    /// Insert a new record. Fails with `Collision` if the digest is live.
    async fn put(&self, record: RefreshRecord) -> Result<(), RefreshStoreError>;

    /// Expired records are reported as absent.
    async fn get(&self, digest: &TokenDigest) -> Result<Option<RefreshRecord>, RefreshStoreError>;

    /// Deleting an absent record is not an error.
    async fn delete(&self, digest: &TokenDigest) -> Result<(), RefreshStoreError>;

    async fn delete_all_for_user(&self, user_id: UserId) -> Result<u64, RefreshStoreError>;

    async fn delete_family(
        &self,
        user_id: UserId,
        family_id: FamilyId,
    ) -> Result<u64, RefreshStoreError>;

    /// Atomically retire `old` and insert `new`. Only one caller can ever
    /// observe `Rotated` for a given `old` digest.
    async fn rotate(
        &self,
        old: &TokenDigest,
        new: RefreshRecord,
    ) -> Result<RotateOutcome, RefreshStoreError>;

    /// Drop expired records. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, RefreshStoreError>;
}
