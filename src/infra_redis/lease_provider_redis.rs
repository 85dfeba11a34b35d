use crate::application_port::*;
use crate::domain_port::*;
use redis::Script;
use redis::aio::ConnectionManager;
use std::time::Duration;

const LEASE_RELEASE: &str = include_str!("lease_release.lua");

/// Leases shared by every instance talking to the same Redis, via
/// `SET NX PX`. Expiry is enforced by Redis, so a crashed holder only blocks
/// the key for one TTL.
pub struct RedisLeaseProvider {
    conn: ConnectionManager,
    prefix: String,
    release_script: Script,
}

impl RedisLeaseProvider {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisLeaseProvider {
            conn,
            prefix: prefix.into(),
            release_script: Script::new(LEASE_RELEASE),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:lease:{}", self.prefix, key)
    }
}

#[async_trait::async_trait]
impl LeaseProvider for RedisLeaseProvider {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<Lease>, AuthError> {
        let lease = Lease::new(key);
        let ttl_ms = ttl.as_millis().max(1) as u64;

        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(&lease.token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        Ok(reply.map(|_| lease))
    }

    async fn release(&self, lease: &Lease) -> Result<(), AuthError> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .release_script
            .key(self.key(&lease.key))
            .arg(&lease.token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(())
    }
}
