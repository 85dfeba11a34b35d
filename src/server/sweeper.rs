use crate::application_impl::RotationArbiter;
use crate::domain_port::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Periodically drops expired sessions and stale rotation cache entries.
pub struct Sweeper {
    store: Arc<dyn SessionStore>,
    arbiter: Arc<RotationArbiter>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn SessionStore>,
        arbiter: Arc<RotationArbiter>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            store,
            arbiter,
            clock,
            interval,
            cancellation_token,
        }
    }

    pub async fn tick_once(&self) -> anyhow::Result<u64> {
        let now = self.clock.now();
        let pruned = self.arbiter.prune_recent(now);
        let swept = self.store.sweep_expired(now).await?;
        if swept > 0 || pruned > 0 {
            tracing::debug!(swept, pruned, "sweep done");
        }
        Ok(swept)
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("Sweeper shutting down...");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick_once().await {
                        tracing::error!("Sweeper error: {:#?}", e);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::*;
    use crate::domain_model::*;
    use crate::infra_local::*;
    use chrono::Utc;
    use jsonwebtoken::Algorithm;

    fn session(subject_id: SubjectId, expires_at: chrono::DateTime<Utc>) -> Session {
        Session {
            session_id: SessionId::new_random(),
            subject_id,
            refresh_token_hash: "00".to_string(),
            claims: CustomClaims::new(),
            created_at: expires_at - chrono::Duration::days(1),
            issued_at: expires_at - chrono::Duration::days(1),
            expires_at,
        }
    }

    fn arbiter(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Arc<RotationArbiter> {
        let issuer = JwtTokenIssuer::try_new(
            JwtConfig {
                issuer: "sessionguard.test".to_string(),
                audience: "test-client".to_string(),
                algorithm: Algorithm::HS256,
                access_ttl: Duration::from_secs(60),
                refresh_ttl: Duration::from_secs(3600),
                signing_key: b"sweeper-key".to_vec(),
            },
            clock.clone(),
        )
        .unwrap();
        Arc::new(RotationArbiter::new(
            store,
            Arc::new(LocalLeaseProvider::new()),
            Arc::new(issuer),
            Arc::new(HmacTokenHasher::new(b"pepper".to_vec())),
            clock,
            ArbiterConfig {
                leeway: Duration::from_secs(60),
                lock: LockPolicy {
                    lease_ttl: Duration::from_secs(1),
                    retry_base: Duration::from_millis(5),
                    retry_max: Duration::from_millis(20),
                    timeout: Duration::from_millis(100),
                },
            },
        ))
    }

    #[tokio::test]
    async fn tick_removes_expired_sessions_only() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemorySessionStore::new());

        let subject = SubjectId(uuid::Uuid::new_v4());
        let now = clock.now();
        let stale = session(subject, now - chrono::Duration::seconds(1));
        let live = session(subject, now + chrono::Duration::hours(1));
        store.put(&stale).await.unwrap();
        store.put(&live).await.unwrap();

        let sweeper = Sweeper::new(
            store.clone(),
            arbiter(store.clone(), clock.clone()),
            clock.clone(),
            Duration::from_secs(60),
            CancellationToken::new(),
        );
        assert_eq!(sweeper.tick_once().await.unwrap(), 1);
        assert!(store.get(stale.session_id).await.unwrap().is_none());
        assert!(store.get(live.session_id).await.unwrap().is_some());
        assert_eq!(sweeper.tick_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemorySessionStore::new());
        let cancel = CancellationToken::new();
        let sweeper = Sweeper::new(
            store.clone(),
            arbiter(store, clock.clone()),
            clock,
            Duration::from_secs(3600),
            cancel.clone(),
        );

        let handle = tokio::spawn(async move { sweeper.run().await });
        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
