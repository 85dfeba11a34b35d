use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_local::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::server::Sweeper;
use crate::settings::{self, Secrets, Settings};
use jsonwebtoken::Algorithm;
use redis::aio::ConnectionManager;
use sqlx::{MySql, Pool};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Process-wide resources: constructed once, injected everywhere, disposed by
/// [`Server::shutdown`].
pub struct Server {
    pub session_service: Arc<dyn SessionService>,
    pub service_key: Arc<str>,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    pool: Option<Pool<MySql>>,
}

impl Server {
    pub async fn try_new(settings: &Settings, secrets: Secrets) -> anyhow::Result<Self> {
        Self::with_clock(settings, secrets, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(
        settings: &Settings,
        secrets: Secrets,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let lock_policy = lock_policy(&settings.lock)?;

        let needs_redis = settings.store.backend == "redis" || settings.lock.backend == "redis";
        let redis_manager = if needs_redis {
            let dsn = settings
                .store
                .redis_dsn
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("store.redis_dsn is required for redis backends"))?;
            Some(connect_redis(dsn).await?)
        } else {
            None
        };

        let mut pool = None;
        let session_store: Arc<dyn SessionStore> = match settings.store.backend.as_str() {
            "memory" => Arc::new(MemorySessionStore::new()),
            "redis" => Arc::new(RedisSessionStore::new(
                redis_manager.clone().ok_or_else(|| anyhow::anyhow!("redis not connected"))?,
                settings.store.prefix.clone(),
                clock.clone(),
            )),
            "mysql" => {
                let dsn = settings.store.mysql_dsn.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("store.mysql_dsn is required for the mysql backend")
                })?;
                let mysql = Pool::<MySql>::connect(dsn).await?;
                pool = Some(mysql.clone());
                Arc::new(MySqlSessionStore::new(mysql))
            }
            other => return Err(anyhow::anyhow!("Unknown store backend: {}", other)),
        };

        let lease_provider: Arc<dyn LeaseProvider> = match settings.lock.backend.as_str() {
            "local" => Arc::new(LocalLeaseProvider::new()),
            "redis" => Arc::new(RedisLeaseProvider::new(
                redis_manager.clone().ok_or_else(|| anyhow::anyhow!("redis not connected"))?,
                settings.store.prefix.clone(),
            )),
            other => return Err(anyhow::anyhow!("Unknown lock backend: {}", other)),
        };

        let algorithm = Algorithm::from_str(&settings.token.algorithm)
            .map_err(|e| anyhow::anyhow!("token.algorithm: {}", e))?;
        let token_issuer: Arc<dyn TokenIssuer> = Arc::new(JwtTokenIssuer::try_new(
            JwtConfig {
                issuer: settings.token.issuer.clone(),
                audience: settings.token.audience.clone(),
                algorithm,
                access_ttl: Duration::from_secs(settings.token.access_ttl_secs),
                refresh_ttl: Duration::from_secs(settings.token.refresh_ttl_secs),
                signing_key: secrets.signing_key,
            },
            clock.clone(),
        )?);
        let token_hasher: Arc<dyn TokenHasher> = Arc::new(HmacTokenHasher::new(secrets.hash_key));

        let arbiter = Arc::new(RotationArbiter::new(
            session_store.clone(),
            lease_provider,
            token_issuer.clone(),
            token_hasher.clone(),
            clock.clone(),
            ArbiterConfig {
                leeway: Duration::from_secs(settings.token.leeway_secs),
                lock: lock_policy,
            },
        ));

        let session_service: Arc<dyn SessionService> = Arc::new(RealSessionService::new(
            session_store.clone(),
            token_issuer,
            token_hasher,
            clock.clone(),
            arbiter.clone(),
        ));

        // region runtime infra
        let cancel = CancellationToken::new();

        let sweeper = Sweeper::new(
            session_store,
            arbiter,
            clock,
            Duration::from_secs(settings.store.sweep_interval_secs.max(1)),
            cancel.clone(),
        );
        let sweeper_handle = tokio::spawn(async move {
            let _ = sweeper.run().await;
        });

        // endregion

        info!(
            store = %settings.store.backend,
            lock = %settings.lock.backend,
            "server started"
        );

        Ok(Self {
            session_service,
            service_key: Arc::from(secrets.service_key),
            sweeper_handle: Mutex::new(Some(sweeper_handle)),
            cancel,
            pool,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        let handle = match self.sweeper_handle.lock() {
            Ok(mut lock) => lock.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let r = handle.await;
            info!("sweeper handle dropped: {:?}", r);
        }

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

/// A zero lease TTL lets the next caller take the lease over at once, and a
/// zero retry base busy-loops until the deadline.
fn lock_policy(lock: &settings::Lock) -> anyhow::Result<LockPolicy> {
    if lock.lease_ttl_ms == 0 {
        return Err(anyhow::anyhow!("lock.lease_ttl_ms must be positive"));
    }
    if lock.retry_base_ms == 0 {
        return Err(anyhow::anyhow!("lock.retry_base_ms must be positive"));
    }
    if lock.retry_max_ms < lock.retry_base_ms {
        return Err(anyhow::anyhow!(
            "lock.retry_max_ms ({}) is below lock.retry_base_ms ({})",
            lock.retry_max_ms,
            lock.retry_base_ms
        ));
    }
    if lock.timeout_ms == 0 {
        return Err(anyhow::anyhow!("lock.timeout_ms must be positive"));
    }

    Ok(LockPolicy {
        lease_ttl: Duration::from_millis(lock.lease_ttl_ms),
        retry_base: Duration::from_millis(lock.retry_base_ms),
        retry_max: Duration::from_millis(lock.retry_max_ms),
        timeout: Duration::from_millis(lock.timeout_ms),
    })
}

async fn connect_redis(dsn: &str) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(dsn)?;
    let mut manager = client.get_connection_manager().await?;
    let pong: String = redis::cmd("PING").query_async(&mut manager).await?;
    debug!("redis PING -> {}", pong);
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock(lease_ttl_ms: u64, retry_base_ms: u64, retry_max_ms: u64) -> settings::Lock {
        settings::Lock {
            backend: "local".to_string(),
            lease_ttl_ms,
            retry_base_ms,
            retry_max_ms,
            timeout_ms: 3000,
        }
    }

    #[test]
    fn lock_policy_rejects_degenerate_settings() {
        assert!(lock_policy(&lock(0, 20, 250)).is_err());
        assert!(lock_policy(&lock(5000, 0, 250)).is_err());
        assert!(lock_policy(&lock(5000, 300, 250)).is_err());

        let policy = lock_policy(&lock(5000, 20, 250)).unwrap();
        assert_eq!(policy.lease_ttl, Duration::from_secs(5));
        assert_eq!(policy.retry_max, Duration::from_millis(250));
    }
}
