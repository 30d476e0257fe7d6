use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisWrite, Script, ScriptInvocation, ToRedisArgs};
use std::collections::HashMap;

const REFRESH_PUT: &str = include_str!("refresh_put.lua");
const REFRESH_ROTATE: &str = include_str!("refresh_rotate.lua");
const REFRESH_DELETE: &str = include_str!("refresh_delete.lua");
const REFRESH_DELETE_WHERE: &str = include_str!("refresh_delete_where.lua");
const REFRESH_PRUNE: &str = include_str!("refresh_prune.lua");

const SCAN_BATCH: usize = 200;

/// Refresh records live in `{prefix}:rt:{digest}` hashes that expire with
/// the token. `{prefix}:user:{user_id}` sets index them per user so a whole
/// account can be revoked.
///
/// Every script declares the keys it touches, but a record and its user set
/// hash to different slots, so this store needs a single-node (or
/// sentinel-managed) Redis rather than Redis Cluster.
pub struct RedisRefreshStore {
    conn: ConnectionManager,
    prefix: String,
    put_script: Script,
    rotate_script: Script,
    delete_script: Script,
    delete_where_script: Script,
    prune_script: Script,
}

impl RedisRefreshStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisRefreshStore {
            conn,
            prefix: prefix.into(),
            put_script: Script::new(REFRESH_PUT),
            rotate_script: Script::new(REFRESH_ROTATE),
            delete_script: Script::new(REFRESH_DELETE),
            delete_where_script: Script::new(REFRESH_DELETE_WHERE),
            prune_script: Script::new(REFRESH_PRUNE),
        }
    }

    fn record_prefix(&self) -> String {
        format!("{}:rt:", self.prefix)
    }

    fn user_prefix(&self) -> String {
        format!("{}:user:", self.prefix)
    }

    fn record_key(&self, digest: &TokenDigest) -> String {
        format!("{}{}", self.record_prefix(), digest)
    }

    fn user_key(&self, user_id: UserId) -> String {
        format!("{}{}", self.user_prefix(), user_id)
    }

    /// Declares each member's record key as `KEYS[i]` and the digest as
    /// `ARGV[i]`, after the set itself in slot 1.
    fn with_members(&self, invocation: &mut ScriptInvocation<'_>, digests: &[String]) {
        for digest in digests {
            invocation
                .key(format!("{}{}", self.record_prefix(), digest))
                .arg(digest);
        }
    }

    async fn members(
        conn: &mut ConnectionManager,
        set_key: &str,
    ) -> Result<Vec<String>, RefreshStoreError> {
        let members: Vec<String> = conn.smembers(set_key).await.map_err(store_err)?;
        Ok(members)
    }

    /// Members added to the set after the snapshot are left alone.
    async fn delete_where(&self, user_id: UserId, family: &str) -> Result<u64, RefreshStoreError> {
        let mut conn = self.conn.clone();
        let user_key = self.user_key(user_id);
        let digests = Self::members(&mut conn, &user_key).await?;
        if digests.is_empty() {
            return Ok(0);
        }

        let mut invocation = self.delete_where_script.prepare_invoke();
        invocation.key(&user_key).arg(family);
        self.with_members(&mut invocation, &digests);
        invocation.invoke_async(&mut conn).await.map_err(store_err)
    }

    async fn prune(
        &self,
        conn: &mut ConnectionManager,
        set_key: &str,
    ) -> Result<u64, RefreshStoreError> {
        let digests = Self::members(conn, set_key).await?;
        if digests.is_empty() {
            return Ok(0);
        }

        let mut invocation = self.prune_script.prepare_invoke();
        invocation.key(set_key).arg("");
        self.with_members(&mut invocation, &digests);
        invocation.invoke_async(conn).await.map_err(store_err)
    }

    fn ttl_ms(expires_at: DateTime<Utc>) -> i64 {
        (expires_at - Utc::now()).num_milliseconds().max(1)
    }

    fn parse_record(
        digest: &TokenDigest,
        user: &str,
        family: &str,
        state: &str,
        exp_ms: &str,
    ) -> Result<RefreshRecord, RefreshStoreError> {
        let user_id = user
            .parse::<UserId>()
            .map_err(|e| RefreshStoreError::Store(format!("invalid user id: {e}")))?;
        let family_id = family
            .parse::<FamilyId>()
            .map_err(|e| RefreshStoreError::Store(format!("invalid family id: {e}")))?;
        let state = state.parse::<RefreshState>().map_err(RefreshStoreError::Store)?;
        let exp_ms = exp_ms
            .parse::<i64>()
            .map_err(|e| RefreshStoreError::Store(format!("invalid expiry: {e}")))?;
        let expires_at = DateTime::<Utc>::from_timestamp_millis(exp_ms)
            .ok_or_else(|| RefreshStoreError::Store("expiry out of range".to_string()))?;

        Ok(RefreshRecord {
            digest: digest.clone(),
            user_id,
            family_id,
            expires_at,
            state,
        })
    }
}

impl ToRedisArgs for UserId {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(self.to_string().as_bytes())
    }
}

fn store_err(e: redis::RedisError) -> RefreshStoreError {
    RefreshStoreError::Store(e.to_string())
}

#[async_trait::async_trait]
impl RefreshStore for RedisRefreshStore {
    async fn put(&self, record: RefreshRecord) -> Result<(), RefreshStoreError> {
        let mut conn = self.conn.clone();
        let inserted: i64 = self
            .put_script
            .key(self.record_key(&record.digest))
            .key(self.user_key(record.user_id))
            .arg(&record.digest.0)
            .arg(record.user_id)
            .arg(record.family_id.to_string())
            .arg(record.expires_at.timestamp_millis())
            .arg(Self::ttl_ms(record.expires_at))
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;

        match inserted {
            1 => Ok(()),
            _ => Err(RefreshStoreError::Collision),
        }
    }

    async fn get(&self, digest: &TokenDigest) -> Result<Option<RefreshRecord>, RefreshStoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(self.record_key(digest))
            .await
            .map_err(store_err)?;

        let (Some(user), Some(family), Some(state), Some(exp)) = (
            fields.get("user"),
            fields.get("family"),
            fields.get("state"),
            fields.get("exp"),
        ) else {
            return Ok(None);
        };

        let record = Self::parse_record(digest, user, family, state, exp)?;
        // Redis expiry can trail the wall clock by a few milliseconds.
        if record.is_expired_at(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn delete(&self, digest: &TokenDigest) -> Result<(), RefreshStoreError> {
        let mut conn = self.conn.clone();
        let record_key = self.record_key(digest);
        let user: Option<String> = conn.hget(&record_key, "user").await.map_err(store_err)?;
        // Already gone; the sweep prunes any leftover index member.
        let Some(user) = user else {
            return Ok(());
        };
        let user_id = user
            .parse::<UserId>()
            .map_err(|e| RefreshStoreError::Store(format!("invalid user id: {e}")))?;

        let _: i64 = self
            .delete_script
            .key(record_key)
            .key(self.user_key(user_id))
            .arg(&digest.0)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: UserId) -> Result<u64, RefreshStoreError> {
        self.delete_where(user_id, "").await
    }

    async fn delete_family(
        &self,
        user_id: UserId,
        family_id: FamilyId,
    ) -> Result<u64, RefreshStoreError> {
        self.delete_where(user_id, &family_id.to_string()).await
    }

    async fn rotate(
        &self,
        old: &TokenDigest,
        new: RefreshRecord,
    ) -> Result<RotateOutcome, RefreshStoreError> {
        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .rotate_script
            .key(self.record_key(old))
            .key(self.record_key(&new.digest))
            .key(self.user_key(new.user_id))
            .arg(&new.digest.0)
            .arg(new.user_id)
            .arg(new.family_id.to_string())
            .arg(new.expires_at.timestamp_millis())
            .arg(Self::ttl_ms(new.expires_at))
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;

        match reply.as_slice() {
            [status] if status == "rotated" => Ok(RotateOutcome::Rotated),
            [status] if status == "missing" => Ok(RotateOutcome::NotFound),
            [status] if status == "collision" => Err(RefreshStoreError::Collision),
            [status, user, family, exp] if status == "reused" => {
                let record = Self::parse_record(old, user, family, "rotated", exp)?;
                Ok(RotateOutcome::Reused(record))
            }
            other => Err(RefreshStoreError::Store(format!(
                "unexpected rotate reply: {other:?}"
            ))),
        }
    }

    /// Records expire through key TTLs; this prunes index entries that
    /// point at records Redis already dropped.
    async fn purge_expired(&self) -> Result<u64, RefreshStoreError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", self.user_prefix());

        let mut cursor: u64 = 0;
        let mut pruned: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(store_err)?;

            for key in keys {
                pruned += self.prune(&mut conn, &key).await?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(pruned)
    }
}

/// Needs a reachable Redis: `REDIS_URL=redis://127.0.0.1/ cargo test -- --ignored`.
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    async fn store() -> RedisRefreshStore {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
        let conn = redis::Client::open(url)
            .unwrap()
            .get_connection_manager()
            .await
            .unwrap();
        // A fresh prefix per test keeps runs independent.
        RedisRefreshStore::new(conn, format!("gatehouse-test-{}", nanoid::nanoid!(8)))
    }

    fn record(digest: &str, user_id: UserId, family_id: FamilyId, ttl: Duration) -> RefreshRecord {
        RefreshRecord {
            digest: TokenDigest(digest.to_string()),
            user_id,
            family_id,
            expires_at: Utc::now() + ttl,
            state: RefreshState::Active,
        }
    }

    fn digest(value: &str) -> TokenDigest {
        TokenDigest(value.to_string())
    }

    #[tokio::test]
    #[ignore = "needs a running redis"]
    async fn put_get_and_collision() {
        let store = store().await;
        let user = UserId::new_random();
        let family = FamilyId::new_random();

        store
            .put(record("a", user, family, Duration::hours(1)))
            .await
            .unwrap();
        let stored = store.get(&digest("a")).await.unwrap().unwrap();
        assert_eq!(stored.user_id, user);
        assert_eq!(stored.family_id, family);
        assert_eq!(stored.state, RefreshState::Active);

        let again = store
            .put(record("a", UserId::new_random(), family, Duration::hours(1)))
            .await;
        assert!(matches!(again, Err(RefreshStoreError::Collision)));
        assert!(store.get(&digest("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "needs a running redis"]
    async fn rotate_leaves_a_tombstone_that_reports_reuse() {
        let store = store().await;
        let user = UserId::new_random();
        let family = FamilyId::new_random();
        store
            .put(record("a", user, family, Duration::hours(1)))
            .await
            .unwrap();

        let outcome = store
            .rotate(&digest("a"), record("b", user, family, Duration::hours(1)))
            .await
            .unwrap();
        assert!(matches!(outcome, RotateOutcome::Rotated));
        assert_eq!(
            store.get(&digest("a")).await.unwrap().unwrap().state,
            RefreshState::Rotated
        );
        assert_eq!(
            store.get(&digest("b")).await.unwrap().unwrap().state,
            RefreshState::Active
        );

        match store
            .rotate(&digest("a"), record("c", user, family, Duration::hours(1)))
            .await
            .unwrap()
        {
            RotateOutcome::Reused(old) => {
                assert_eq!(old.user_id, user);
                assert_eq!(old.family_id, family);
            }
            other => panic!("expected reuse, got {other:?}"),
        }
        assert!(store.get(&digest("c")).await.unwrap().is_none());

        let outcome = store
            .rotate(&digest("nope"), record("d", user, family, Duration::hours(1)))
            .await
            .unwrap();
        assert!(matches!(outcome, RotateOutcome::NotFound));
    }

    #[tokio::test]
    #[ignore = "needs a running redis"]
    async fn rotate_refuses_a_live_new_digest() {
        let store = store().await;
        let user = UserId::new_random();
        let family = FamilyId::new_random();
        store
            .put(record("a", user, family, Duration::hours(1)))
            .await
            .unwrap();
        store
            .put(record("b", user, family, Duration::hours(1)))
            .await
            .unwrap();

        let outcome = store
            .rotate(&digest("a"), record("b", user, family, Duration::hours(1)))
            .await;
        assert!(matches!(outcome, Err(RefreshStoreError::Collision)));
        assert_eq!(
            store.get(&digest("a")).await.unwrap().unwrap().state,
            RefreshState::Active
        );
    }

    #[tokio::test]
    #[ignore = "needs a running redis"]
    async fn concurrent_rotation_has_one_winner() {
        let store = Arc::new(store().await);
        let user = UserId::new_random();
        let family = FamilyId::new_random();
        store
            .put(record("root", user, family, Duration::hours(1)))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .rotate(
                        &digest("root"),
                        record(&format!("next-{i}"), user, family, Duration::hours(1)),
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut rotated = 0;
        for handle in handles {
            match handle.await.unwrap() {
                RotateOutcome::Rotated => rotated += 1,
                RotateOutcome::Reused(_) => {}
                RotateOutcome::NotFound => panic!("record vanished"),
            }
        }
        assert_eq!(rotated, 1);
    }

    #[tokio::test]
    #[ignore = "needs a running redis"]
    async fn delete_scopes_report_what_they_removed() {
        let store = store().await;
        let ada = UserId::new_random();
        let bob = UserId::new_random();
        let laptop = FamilyId::new_random();
        let phone = FamilyId::new_random();

        store
            .put(record("l1", ada, laptop, Duration::hours(1)))
            .await
            .unwrap();
        store
            .rotate(&digest("l1"), record("l2", ada, laptop, Duration::hours(1)))
            .await
            .unwrap();
        store
            .put(record("p1", ada, phone, Duration::hours(1)))
            .await
            .unwrap();
        store
            .put(record("b1", bob, FamilyId::new_random(), Duration::hours(1)))
            .await
            .unwrap();

        // The tombstone belongs to the family too.
        assert_eq!(store.delete_family(ada, laptop).await.unwrap(), 2);
        assert!(store.get(&digest("l2")).await.unwrap().is_none());
        assert!(store.get(&digest("p1")).await.unwrap().is_some());

        assert_eq!(store.delete_all_for_user(ada).await.unwrap(), 1);
        assert_eq!(store.delete_all_for_user(ada).await.unwrap(), 0);
        assert!(store.get(&digest("b1")).await.unwrap().is_some());

        store.delete(&digest("b1")).await.unwrap();
        store.delete(&digest("b1")).await.unwrap();
        assert!(store.get(&digest("b1")).await.unwrap().is_none());
        assert_eq!(store.delete_all_for_user(bob).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore = "needs a running redis"]
    async fn purge_prunes_index_members_of_expired_records() {
        let store = store().await;
        let user = UserId::new_random();
        let family = FamilyId::new_random();
        store
            .put(record("short", user, family, Duration::milliseconds(50)))
            .await
            .unwrap();
        store
            .put(record("long", user, family, Duration::hours(1)))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        assert!(store.get(&digest("short")).await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
        assert_eq!(store.delete_all_for_user(user).await.unwrap(), 1);
    }
}
