use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisWrite, Script, ToRedisArgs};
use std::sync::Arc;

const SUBJECT_REVOKE: &str = include_str!("subject_revoke.lua");
const SESSION_REPLACE: &str = include_str!("session_replace.lua");

/// Sessions as JSON strings with a native TTL, plus one index set per subject.
///
/// Layout under `prefix`:
/// `{prefix}:session:{session_id}` and `{prefix}:subject:{subject_id}`.
///
/// Single-node Redis only: a subject's index set and its session keys hash to
/// different cluster slots, and the revoke and replace scripts touch both.
pub struct RedisSessionStore {
    conn: ConnectionManager,
    prefix: String,
    clock: Arc<dyn Clock>,
    revoke_script: Script,
    replace_script: Script,
}

impl RedisSessionStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        RedisSessionStore {
            conn,
            prefix: prefix.into(),
            clock,
            revoke_script: Script::new(SUBJECT_REVOKE),
            replace_script: Script::new(SESSION_REPLACE),
        }
    }

    fn session_prefix(&self) -> String {
        format!("{}:session:", self.prefix)
    }

    fn session_key(&self, id: SessionId) -> String {
        format!("{}{}", self.session_prefix(), id)
    }

    fn subject_key(&self, id: SubjectId) -> String {
        format!("{}:subject:{}", self.prefix, id)
    }

    fn ttl_secs(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
        let secs = (until - now).num_seconds();
        if secs <= 0 { 1 } else { secs as u64 }
    }

    fn decode(raw: &str) -> Result<Session, AuthError> {
        serde_json::from_str(raw).map_err(|e| AuthError::Store(e.to_string()))
    }
}

impl ToRedisArgs for SessionId {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(self.to_string().as_bytes())
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, session_id: SessionId) -> Result<Option<Session>, AuthError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(self.session_key(session_id))
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        raw.as_deref().map(Self::decode).transpose()
    }

    async fn put(&self, session: &Session) -> Result<(), AuthError> {
        let json = serde_json::to_string(session).map_err(|e| AuthError::Store(e.to_string()))?;
        let ttl = Self::ttl_secs(session.expires_at, self.clock.now());
        let subject_key = self.subject_key(session.subject_id);

        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .set_ex(self.session_key(session.session_id), json, ttl)
            .ignore()
            .sadd(&subject_key, session.session_id)
            .ignore()
            // sessions of a subject never outlive its newest one
            .expire(&subject_key, ttl as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(())
    }

    async fn replace(&self, session: &Session, expected_hash: &str) -> Result<bool, AuthError> {
        let json = serde_json::to_string(session).map_err(|e| AuthError::Store(e.to_string()))?;
        let ttl = Self::ttl_secs(session.expires_at, self.clock.now());

        let mut conn = self.conn.clone();
        let swapped: i64 = self
            .replace_script
            .key(self.session_key(session.session_id))
            .key(self.subject_key(session.subject_id))
            .arg(expected_hash)
            .arg(session.subject_id.to_string())
            .arg(json)
            .arg(ttl)
            .arg(session.session_id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(swapped == 1)
    }

    async fn delete(&self, session_id: SessionId) -> Result<bool, AuthError> {
        let Some(session) = self.get(session_id).await? else {
            return Ok(false);
        };
        let mut conn = self.conn.clone();
        let (removed, _): (u64, u64) = redis::pipe()
            .atomic()
            .del(self.session_key(session_id))
            .srem(self.subject_key(session.subject_id), session_id)
            .query_async(&mut conn)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn delete_all_for_subject(&self, subject_id: SubjectId) -> Result<u64, AuthError> {
        let subject_key = self.subject_key(subject_id);
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers(&subject_key)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        if ids.is_empty() {
            return Ok(0);
        }

        // every key the script deletes is declared up front
        let mut invocation = self.revoke_script.key(&subject_key);
        for id in &ids {
            invocation.key(format!("{}{}", self.session_prefix(), id));
            invocation.arg(id);
        }
        let removed: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(removed.max(0) as u64)
    }

    async fn list_for_subject(&self, subject_id: SubjectId) -> Result<Vec<Session>, AuthError> {
        let subject_key = self.subject_key(subject_id);
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers(&subject_key)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| format!("{}{}", self.session_prefix(), id))
            .collect();
        let raws: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        let mut sessions = Vec::with_capacity(raws.len());
        let mut stale = Vec::new();
        for (id, raw) in ids.iter().zip(raws) {
            match raw {
                Some(raw) => sessions.push(Self::decode(&raw)?),
                None => stale.push(id.clone()),
            }
        }
        if !stale.is_empty() {
            let _: () = conn
                .srem(&subject_key, stale)
                .await
                .map_err(|e| AuthError::Store(e.to_string()))?;
        }

        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn sweep_expired(&self, _now: DateTime<Utc>) -> Result<u64, AuthError> {
        // session keys carry their own TTL
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_follows_the_supplied_clock() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let until = now + chrono::Duration::seconds(90);

        assert_eq!(RedisSessionStore::ttl_secs(until, now), 90);
        // a clock far behind wall time still yields the full window
        assert_eq!(
            RedisSessionStore::ttl_secs(until, now - chrono::Duration::seconds(10)),
            100
        );
        assert_eq!(RedisSessionStore::ttl_secs(now, until), 1);
    }
}
