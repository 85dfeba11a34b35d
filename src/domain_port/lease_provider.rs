use crate::application_port::*;
use std::time::Duration;

/// A time-bounded exclusive grant on `key`. `token` fences the release so a
/// holder whose lease already expired cannot free someone else's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub key: String,
    pub token: String,
}

impl Lease {
    pub fn new(key: impl Into<String>) -> Self {
        Lease {
            key: key.into(),
            token: nanoid::nanoid!(21),
        }
    }
}

#[async_trait::async_trait]
pub trait LeaseProvider: Send + Sync {
    /// `Ok(None)` means the key is currently held by someone else.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<Lease>, AuthError>;
    /// Releasing an expired or foreign lease is a no-op.
    async fn release(&self, lease: &Lease) -> Result<(), AuthError>;
}
