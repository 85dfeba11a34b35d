use crate::application_impl::RotationArbiter;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use std::sync::Arc;
use tracing::info;

pub struct RealSessionService {
    store: Arc<dyn SessionStore>,
    issuer: Arc<dyn TokenIssuer>,
    hasher: Arc<dyn TokenHasher>,
    clock: Arc<dyn Clock>,
    arbiter: Arc<RotationArbiter>,
}

impl RealSessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        issuer: Arc<dyn TokenIssuer>,
        hasher: Arc<dyn TokenHasher>,
        clock: Arc<dyn Clock>,
        arbiter: Arc<RotationArbiter>,
    ) -> Self {
        Self {
            store,
            issuer,
            hasher,
            clock,
            arbiter,
        }
    }
}

#[async_trait::async_trait]
impl SessionService for RealSessionService {
    async fn start_session(
        &self,
        subject_id: SubjectId,
        claims: CustomClaims,
    ) -> Result<TokenPair, AuthError> {
        let session_id = SessionId::new_random();
        let issued = self.issuer.issue(IssueRequest {
            subject_id,
            session_id,
            claims: &claims,
            not_before: None,
        })?;

        let session = Session {
            session_id,
            subject_id,
            refresh_token_hash: self.hasher.hash(&issued.pair.refresh_token.0)?,
            claims,
            created_at: self.clock.now(),
            issued_at: issued.refresh_issued_at,
            expires_at: issued.pair.refresh_token_expires_at,
        };
        self.store.put(&session).await?;

        info!(%session_id, %subject_id, "session started");
        Ok(issued.pair)
    }

    async fn refresh(
        &self,
        session_id: SessionId,
        refresh_token: &str,
    ) -> Result<RefreshOutcome, AuthError> {
        self.arbiter.refresh(session_id, refresh_token).await
    }

    async fn sign_out(
        &self,
        subject_id: SubjectId,
        session_id: SessionId,
    ) -> Result<(), AuthError> {
        self.arbiter.end_session(subject_id, session_id).await
    }

    async fn sign_out_everywhere(&self, subject_id: SubjectId) -> Result<u64, AuthError> {
        let removed = self.store.delete_all_for_subject(subject_id).await?;
        info!(%subject_id, removed, "signed out everywhere");
        Ok(removed)
    }

    async fn list_sessions(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<SessionSummary>, AuthError> {
        let now = self.clock.now();
        let sessions = self.store.list_for_subject(subject_id).await?;
        Ok(sessions
            .iter()
            .filter(|s| !s.is_expired(now))
            .map(SessionSummary::from)
            .collect())
    }

    async fn verify_access(&self, token: &str) -> Result<SubjectId, AuthError> {
        self.issuer.verify_access(token)
    }
}
