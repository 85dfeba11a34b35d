use crate::application_port::*;
use crate::domain_port::*;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

struct HeldLease {
    token: String,
    deadline: Instant,
}

/// Leases that only exclude callers inside this process.
#[derive(Default)]
pub struct LocalLeaseProvider {
    held: DashMap<String, HeldLease>,
}

impl LocalLeaseProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl LeaseProvider for LocalLeaseProvider {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<Lease>, AuthError> {
        let now = Instant::now();
        let lease = Lease::new(key);
        let fresh = || HeldLease {
            token: lease.token.clone(),
            deadline: now + ttl,
        };

        let mut acquired = false;
        self.held
            .entry(key.to_string())
            .and_modify(|held| {
                // expired leases are taken over
                if held.deadline <= now {
                    *held = fresh();
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                fresh()
            });

        Ok(acquired.then_some(lease))
    }

    async fn release(&self, lease: &Lease) -> Result<(), AuthError> {
        self.held
            .remove_if(&lease.key, |_, held| held.token == lease.token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_is_refused_until_release() {
        let provider = LocalLeaseProvider::new();
        let ttl = Duration::from_secs(5);

        let lease = provider.try_acquire("k", ttl).await.unwrap().unwrap();
        assert!(provider.try_acquire("k", ttl).await.unwrap().is_none());
        assert!(provider.try_acquire("other", ttl).await.unwrap().is_some());

        provider.release(&lease).await.unwrap();
        assert!(provider.try_acquire("k", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_lease_is_taken_over_and_stale_release_is_ignored() {
        let provider = LocalLeaseProvider::new();

        let stale = provider
            .try_acquire("k", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let current = provider
            .try_acquire("k", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stale.token, current.token);

        provider.release(&stale).await.unwrap();
        assert!(
            provider
                .try_acquire("k", Duration::from_secs(5))
                .await
                .unwrap()
                .is_none()
        );
    }
}
