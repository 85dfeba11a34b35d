use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};

/// Durable `SessionId -> Session` mapping. Every operation is atomic with
/// respect to a single session id; cross-session locking is not provided here.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: SessionId) -> Result<Option<Session>, AuthError>;
    /// Upsert. Replaces any hash stored for the same session id.
    async fn put(&self, session: &Session) -> Result<(), AuthError>;
    /// Compare-and-swap: writes `session` only if a record for its id still
    /// exists and holds `expected_hash`. Returns whether the write happened.
    /// A session removed by a concurrent revocation is never written back.
    async fn replace(&self, session: &Session, expected_hash: &str) -> Result<bool, AuthError>;
    /// Returns whether a session was removed.
    async fn delete(&self, session_id: SessionId) -> Result<bool, AuthError>;
    /// Returns the number of sessions removed; zero on repeated calls.
    async fn delete_all_for_subject(&self, subject_id: SubjectId) -> Result<u64, AuthError>;
    async fn list_for_subject(&self, subject_id: SubjectId) -> Result<Vec<Session>, AuthError>;
    /// Removes sessions with `expires_at <= now`. Backends that expire keys on
    /// their own return 0.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError>;
}
