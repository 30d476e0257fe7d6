use crate::domain_port::*;
use crate::logger::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Periodically drops expired refresh records.
pub struct ExpirySweeper {
    refresh_store: Arc<dyn RefreshStore>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl ExpirySweeper {
    pub fn new(
        refresh_store: Arc<dyn RefreshStore>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            refresh_store,
            interval,
            cancellation_token,
        }
    }

    async fn tick_once(&self) -> Result<u64, RefreshStoreError> {
        tokio::time::sleep(self.interval).await;
        self.refresh_store.purge_expired().await
    }

    pub async fn run(&self) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    info!("ExpirySweeper shutting down...");
                    break;
                }
                result = self.tick_once() => {
                    match result {
                        Ok(0) => {}
                        Ok(purged) => debug!(purged, "expired refresh records purged"),
                        Err(e) => error!("ExpirySweeper error: {}", e),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::*;
    use crate::infra_memory::InMemoryRefreshStore;
    use chrono::Utc;

    #[tokio::test]
    async fn sweeps_until_cancelled() {
        let store = Arc::new(InMemoryRefreshStore::new());
        let user_id = UserId::new_random();
        store
            .put(RefreshRecord {
                digest: TokenDigest("stale".to_string()),
                user_id,
                family_id: FamilyId::new_random(),
                expires_at: Utc::now() - chrono::Duration::seconds(1),
                state: RefreshState::Active,
            })
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let sweeper = ExpirySweeper::new(store.clone(), Duration::from_millis(10), cancel.clone());
        let handle = tokio::spawn(async move { sweeper.run().await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.purge_expired().await.unwrap(), 0, "sweeper should have purged it");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop after cancel")
            .unwrap();
    }
}
