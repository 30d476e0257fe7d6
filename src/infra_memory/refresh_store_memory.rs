use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Table {
    records: HashMap<TokenDigest, RefreshRecord>,
    by_user: HashMap<UserId, HashSet<TokenDigest>>,
}

impl Table {
    /// Returns the record if it exists and has not expired. Expired records
    /// are dropped on the way.
    fn live(&mut self, digest: &TokenDigest, now: DateTime<Utc>) -> Option<RefreshRecord> {
        let expired = match self.records.get(digest) {
            None => return None,
            Some(record) => record.is_expired_at(now),
        };
        if expired {
            self.remove(digest);
            return None;
        }
        self.records.get(digest).cloned()
    }

    fn insert(
        &mut self,
        record: RefreshRecord,
        now: DateTime<Utc>,
    ) -> Result<(), RefreshStoreError> {
        if self.live(&record.digest, now).is_some() {
            return Err(RefreshStoreError::Collision);
        }
        self.by_user
            .entry(record.user_id)
            .or_default()
            .insert(record.digest.clone());
        self.records.insert(record.digest.clone(), record);
        Ok(())
    }

    fn remove(&mut self, digest: &TokenDigest) -> Option<RefreshRecord> {
        let record = self.records.remove(digest)?;
        if let Some(digests) = self.by_user.get_mut(&record.user_id) {
            digests.remove(digest);
            if digests.is_empty() {
                self.by_user.remove(&record.user_id);
            }
        }
        Some(record)
    }

    fn remove_where<F>(&mut self, user_id: UserId, keep: F) -> u64
    where
        F: Fn(&RefreshRecord) -> bool,
    {
        let Some(digests) = self.by_user.get(&user_id) else {
            return 0;
        };
        let doomed: Vec<TokenDigest> = digests
            .iter()
            .filter(|d| self.records.get(*d).is_some_and(|r| !keep(r)))
            .cloned()
            .collect();
        doomed.iter().filter(|d| self.remove(d).is_some()).count() as u64
    }
}

/// Process-local refresh store. Every operation takes a single lock, so
/// `rotate` is trivially atomic.
pub struct InMemoryRefreshStore {
    table: Mutex<Table>,
}

impl InMemoryRefreshStore {
    pub fn new() -> Self {
        InMemoryRefreshStore {
            table: Mutex::new(Table::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Table>, RefreshStoreError> {
        self.table
            .lock()
            .map_err(|e| RefreshStoreError::Store(e.to_string()))
    }
}

impl Default for InMemoryRefreshStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RefreshStore for InMemoryRefreshStore {
    async fn put(&self, record: RefreshRecord) -> Result<(), RefreshStoreError> {
        self.lock()?.insert(record, Utc::now())
    }

    async fn get(&self, digest: &TokenDigest) -> Result<Option<RefreshRecord>, RefreshStoreError> {
        Ok(self.lock()?.live(digest, Utc::now()))
    }

    async fn delete(&self, digest: &TokenDigest) -> Result<(), RefreshStoreError> {
        self.lock()?.remove(digest);
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: UserId) -> Result<u64, RefreshStoreError> {
        Ok(self.lock()?.remove_where(user_id, |_| false))
    }

    async fn delete_family(
        &self,
        user_id: UserId,
        family_id: FamilyId,
    ) -> Result<u64, RefreshStoreError> {
        Ok(self
            .lock()?
            .remove_where(user_id, |r| r.family_id != family_id))
    }

    async fn rotate(
        &self,
        old: &TokenDigest,
        new: RefreshRecord,
    ) -> Result<RotateOutcome, RefreshStoreError> {
        let now = Utc::now();
        let mut table = self.lock()?;

        let current = match table.live(old, now) {
            Some(record) => record,
            None => return Ok(RotateOutcome::NotFound),
        };
        if current.state == RefreshState::Rotated {
            return Ok(RotateOutcome::Reused(current));
        }

        table.insert(new, now)?;
        if let Some(record) = table.records.get_mut(old) {
            record.state = RefreshState::Rotated;
        }
        Ok(RotateOutcome::Rotated)
    }

    async fn purge_expired(&self) -> Result<u64, RefreshStoreError> {
        let now = Utc::now();
        let mut table = self.lock()?;
        let expired: Vec<TokenDigest> = table
            .records
            .values()
            .filter(|r| r.is_expired_at(now))
            .map(|r| r.digest.clone())
            .collect();
        for digest in &expired {
            table.remove(digest);
        }
        Ok(expired.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn record(digest: &str, user_id: UserId, family_id: FamilyId, ttl: Duration) -> RefreshRecord {
        RefreshRecord {
            digest: TokenDigest(digest.to_string()),
            user_id,
            family_id,
            expires_at: Utc::now() + ttl,
            state: RefreshState::Active,
        }
    }

    #[tokio::test]
    async fn expired_record_behaves_as_absent() {
        let store = InMemoryRefreshStore::new();
        let user = UserId::new_random();
        store
            .put(record("old", user, FamilyId::new_random(), Duration::seconds(-1)))
            .await
            .unwrap();

        assert!(store.get(&TokenDigest("old".into())).await.unwrap().is_none());

        let outcome = store
            .rotate(
                &TokenDigest("old".into()),
                record("new", user, FamilyId::new_random(), Duration::days(1)),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, RotateOutcome::NotFound));
        assert!(store.get(&TokenDigest("new".into())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_rejects_live_collision_but_reuses_expired_slot() {
        let store = InMemoryRefreshStore::new();
        let user = UserId::new_random();
        let family = FamilyId::new_random();

        store.put(record("a", user, family, Duration::days(1))).await.unwrap();
        let err = store
            .put(record("a", user, family, Duration::days(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshStoreError::Collision));

        store.put(record("b", user, family, Duration::seconds(-5))).await.unwrap();
        store.put(record("b", user, family, Duration::days(1))).await.unwrap();
        assert!(store.get(&TokenDigest("b".into())).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rotate_marks_old_and_detects_reuse() {
        let store = InMemoryRefreshStore::new();
        let user = UserId::new_random();
        let family = FamilyId::new_random();
        store.put(record("a", user, family, Duration::days(1))).await.unwrap();

        let first = store
            .rotate(&TokenDigest("a".into()), record("b", user, family, Duration::days(1)))
            .await
            .unwrap();
        assert!(matches!(first, RotateOutcome::Rotated));

        let second = store
            .rotate(&TokenDigest("a".into()), record("c", user, family, Duration::days(1)))
            .await
            .unwrap();
        match second {
            RotateOutcome::Reused(r) => {
                assert_eq!(r.user_id, user);
                assert_eq!(r.family_id, family);
            }
            other => panic!("expected reuse, got {other:?}"),
        }
        assert!(store.get(&TokenDigest("c".into())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rotate_collision_leaves_old_record_active() {
        let store = InMemoryRefreshStore::new();
        let user = UserId::new_random();
        let family = FamilyId::new_random();
        store.put(record("a", user, family, Duration::days(1))).await.unwrap();
        store.put(record("taken", user, family, Duration::days(1))).await.unwrap();

        let err = store
            .rotate(&TokenDigest("a".into()), record("taken", user, family, Duration::days(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshStoreError::Collision));

        let old = store.get(&TokenDigest("a".into())).await.unwrap().unwrap();
        assert_eq!(old.state, RefreshState::Active);
    }

    #[tokio::test]
    async fn concurrent_rotations_have_one_winner() {
        let store = Arc::new(InMemoryRefreshStore::new());
        let user = UserId::new_random();
        let family = FamilyId::new_random();
        store.put(record("a", user, family, Duration::days(1))).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .rotate(
                        &TokenDigest("a".into()),
                        record(&format!("n{i}"), user, family, Duration::days(1)),
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut rotated = 0;
        let mut reused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                RotateOutcome::Rotated => rotated += 1,
                RotateOutcome::Reused(_) => reused += 1,
                RotateOutcome::NotFound => panic!("record vanished"),
            }
        }
        assert_eq!(rotated, 1);
        assert_eq!(reused, 15);
    }

    #[tokio::test]
    async fn delete_scopes() {
        let store = InMemoryRefreshStore::new();
        let ada = UserId::new_random();
        let bob = UserId::new_random();
        let laptop = FamilyId::new_random();
        let phone = FamilyId::new_random();

        store.put(record("a1", ada, laptop, Duration::days(1))).await.unwrap();
        store.put(record("a2", ada, phone, Duration::days(1))).await.unwrap();
        store.put(record("a3", ada, phone, Duration::days(1))).await.unwrap();
        store.put(record("b1", bob, FamilyId::new_random(), Duration::days(1))).await.unwrap();

        assert_eq!(store.delete_family(ada, phone).await.unwrap(), 2);
        assert!(store.get(&TokenDigest("a1".into())).await.unwrap().is_some());

        store.delete(&TokenDigest("missing".into())).await.unwrap();
        assert_eq!(store.delete_all_for_user(ada).await.unwrap(), 1);
        assert!(store.get(&TokenDigest("a1".into())).await.unwrap().is_none());
        assert!(store.get(&TokenDigest("b1".into())).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn purge_drops_only_expired() {
        let store = InMemoryRefreshStore::new();
        let user = UserId::new_random();
        let family = FamilyId::new_random();
        store.put(record("old", user, family, Duration::seconds(-1))).await.unwrap();
        store.put(record("fresh", user, family, Duration::days(1))).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get(&TokenDigest("fresh".into())).await.unwrap().is_some());
    }
}
