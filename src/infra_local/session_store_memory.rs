use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Session>,
    by_subject: HashMap<SubjectId, HashSet<SessionId>>,
}

impl Inner {
    fn unlink(&mut self, subject_id: SubjectId, session_id: SessionId) {
        if let Some(ids) = self.by_subject.get_mut(&subject_id) {
            ids.remove(&session_id);
            if ids.is_empty() {
                self.by_subject.remove(&subject_id);
            }
        }
    }

    fn remove(&mut self, session_id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&session_id)?;
        self.unlink(session.subject_id, session_id);
        Some(session)
    }
}

/// Process-local session store. Suitable for a single instance and tests.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<Inner>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.sessions.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: SessionId) -> Result<Option<Session>, AuthError> {
        Ok(self.inner.read().await.sessions.get(&session_id).cloned())
    }

    async fn put(&self, session: &Session) -> Result<(), AuthError> {
        let mut inner = self.inner.write().await;
        if let Some(previous) = inner.sessions.insert(session.session_id, session.clone()) {
            if previous.subject_id != session.subject_id {
                inner.unlink(previous.subject_id, previous.session_id);
            }
        }
        inner
            .by_subject
            .entry(session.subject_id)
            .or_default()
            .insert(session.session_id);
        Ok(())
    }

    async fn replace(&self, session: &Session, expected_hash: &str) -> Result<bool, AuthError> {
        let mut inner = self.inner.write().await;
        match inner.sessions.get_mut(&session.session_id) {
            Some(current)
                if current.refresh_token_hash == expected_hash
                    && current.subject_id == session.subject_id =>
            {
                *current = session.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, session_id: SessionId) -> Result<bool, AuthError> {
        Ok(self.inner.write().await.remove(session_id).is_some())
    }

    async fn delete_all_for_subject(&self, subject_id: SubjectId) -> Result<u64, AuthError> {
        let mut inner = self.inner.write().await;
        let Some(ids) = inner.by_subject.remove(&subject_id) else {
            return Ok(0);
        };
        let mut removed = 0;
        for id in ids {
            if inner.sessions.remove(&id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn list_for_subject(&self, subject_id: SubjectId) -> Result<Vec<Session>, AuthError> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<Session> = inner
            .by_subject
            .get(&subject_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.sessions.get(id).cloned())
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let mut inner = self.inner.write().await;
        let expired: Vec<SessionId> = inner
            .sessions
            .values()
            .filter(|s| s.is_expired(now))
            .map(|s| s.session_id)
            .collect();
        for id in &expired {
            inner.remove(*id);
        }
        Ok(expired.len() as u64)
    }
}
