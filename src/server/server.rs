use crate::api::auth::RefreshChannel;
use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::server::ExpirySweeper;
use crate::settings::Settings;
use anyhow::anyhow;
use sqlx::MySqlPool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
    /// Verifies access tokens for handlers mounted alongside `api::app`.
    pub token_codec: Arc<dyn TokenCodec>,
    pub refresh_channel: Arc<RefreshChannel>,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    pool: Option<MySqlPool>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        if settings.auth.signing_key.is_empty() {
            return Err(anyhow!("auth.signing_key must be set"));
        }
        if settings.refresh.digest_key.is_empty() {
            return Err(anyhow!("refresh.digest_key must be set"));
        }

        let refresh_channel = Arc::new(RefreshChannel::from_settings(&settings.refresh)?);
        let reuse_policy: ReusePolicy = settings
            .refresh
            .reuse_policy
            .parse()
            .map_err(|e: String| anyhow!(e))?;

        // region backends
        let mut pool = None;
        let user_repo: Arc<dyn UserRepo> = match settings.user.backend.as_str() {
            "memory" => Arc::new(InMemoryUserRepo::new()),
            "mysql" => {
                let dsn = settings
                    .user
                    .mysql_url
                    .as_deref()
                    .ok_or_else(|| anyhow!("user.mysql_url is required for the mysql backend"))?;
                let mysql = MySqlPool::connect(dsn).await?;
                pool = Some(mysql.clone());
                Arc::new(MySqlUserRepo::new(mysql))
            }
            other => return Err(anyhow!("Unknown user backend: {}", other)),
        };

        let refresh_store: Arc<dyn RefreshStore> = match settings.store.backend.as_str() {
            "memory" => Arc::new(InMemoryRefreshStore::new()),
            "redis" => {
                let dsn = settings
                    .store
                    .redis_url
                    .as_deref()
                    .ok_or_else(|| anyhow!("store.redis_url is required for the redis backend"))?;
                let redis_client = redis::Client::open(dsn)?;
                let redis_manager = redis_client.get_connection_manager().await?;
                Arc::new(RedisRefreshStore::new(
                    redis_manager,
                    settings.store.prefix.clone(),
                ))
            }
            other => return Err(anyhow!("Unknown store backend: {}", other)),
        };
        // endregion

        let credential_hasher: Arc<dyn CredentialHasher> =
            Arc::new(Argon2PasswordHasher::new(&Argon2Config {
                memory_kib: settings.auth.argon2_memory_kib,
                iterations: settings.auth.argon2_iterations,
                parallelism: settings.auth.argon2_parallelism,
            })?);
        let credential_verifier: Arc<dyn CredentialVerifier> = Arc::new(
            RealCredentialVerifier::new(user_repo.clone(), credential_hasher.clone()).await?,
        );

        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: settings.auth.issuer.clone(),
            audience: settings.auth.audience.clone(),
            access_ttl: Duration::from_secs(settings.auth.access_ttl_secs),
            signing_key: settings.auth.signing_key.clone().into_bytes(),
        }));
        let token_issuer: Arc<dyn TokenIssuer> = Arc::new(RealTokenIssuer::new(
            token_codec.clone(),
            refresh_store.clone(),
            RefreshConfig {
                ttl: Duration::from_secs(settings.refresh.ttl_secs),
                digest_key: settings.refresh.digest_key.clone().into_bytes(),
                reuse_policy,
            },
        ));

        let auth_service: Arc<dyn AuthService> = Arc::new(RealAuthService::new(
            user_repo,
            credential_hasher,
            credential_verifier,
            token_issuer,
        ));

        // region runtime infra
        let cancel = CancellationToken::new();
        let sweeper = ExpirySweeper::new(
            refresh_store,
            Duration::from_secs(settings.store.sweep_interval_secs.max(1)),
            cancel.clone(),
        );
        let sweeper_handle = tokio::spawn(async move {
            sweeper.run().await;
        });
        // endregion

        info!(
            user_backend = %settings.user.backend,
            store_backend = %settings.store.backend,
            channel = %settings.refresh.channel,
            "server started"
        );

        Ok(Self {
            auth_service,
            token_codec,
            refresh_channel,
            sweeper_handle: Mutex::new(Some(sweeper_handle)),
            cancel,
            pool,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        let handle = self.sweeper_handle.lock().ok().and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("sweeper handle dropped: {:?}", r);
        }

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
