use crate::application_port::AuthError;
use crate::domain_port::{Lease, LeaseProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct LockPolicy {
    /// Must exceed the worst-case store round trip plus signing time.
    pub lease_ttl: Duration,
    pub retry_base: Duration,
    pub retry_max: Duration,
    /// Overall budget for acquisition; exceeding it yields `LockTimeout`.
    pub timeout: Duration,
}

/// A held lease. Release it with [`LeaseGuard::release`]; if the guard is
/// dropped instead (e.g. the request future was cancelled) the release is
/// spawned onto the current runtime.
pub struct LeaseGuard {
    provider: Arc<dyn LeaseProvider>,
    lease: Option<Lease>,
}

impl LeaseGuard {
    pub async fn acquire(
        provider: Arc<dyn LeaseProvider>,
        key: &str,
        policy: &LockPolicy,
    ) -> Result<Self, AuthError> {
        let deadline = Instant::now() + policy.timeout;
        let mut backoff = policy.retry_base;

        loop {
            if let Some(lease) = provider.try_acquire(key, policy.lease_ttl).await? {
                return Ok(LeaseGuard {
                    provider,
                    lease: Some(lease),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(key, "lease acquisition timed out");
                return Err(AuthError::LockTimeout);
            }
            debug!(key, ?backoff, "lease busy, backing off");
            tokio::time::sleep(backoff.min(deadline - now)).await;
            backoff = (backoff * 2).min(policy.retry_max);
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.lease.as_ref().map(|l| l.key.as_str())
    }

    pub async fn release(mut self) {
        if let Some(lease) = self.lease.take() {
            if let Err(e) = self.provider.release(&lease).await {
                warn!(key = %lease.key, "lease release failed, left to expire: {}", e);
            }
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        let provider = self.provider.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = provider.release(&lease).await {
                        warn!(key = %lease.key, "lease release failed, left to expire: {}", e);
                    }
                });
            }
            Err(_) => warn!(key = %lease.key, "lease dropped outside a runtime, left to expire"),
        }
    }
}
