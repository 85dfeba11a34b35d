use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token invalid")]
    InvalidToken,
    #[error("session unknown")]
    Unauthorized,
    #[error("refresh token reuse detected, all sessions of the subject revoked")]
    CompromisedToken,
    #[error("session lock not acquired in time")]
    LockTimeout,
    #[error("signing error: {0}")]
    Signing(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::LockTimeout)
    }
}

#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    /// Opens a session for an already authenticated subject.
    async fn start_session(
        &self,
        subject_id: SubjectId,
        claims: CustomClaims,
    ) -> Result<TokenPair, AuthError>;
    async fn refresh(
        &self,
        session_id: SessionId,
        refresh_token: &str,
    ) -> Result<RefreshOutcome, AuthError>;
    async fn sign_out(&self, subject_id: SubjectId, session_id: SessionId)
    -> Result<(), AuthError>;
    async fn sign_out_everywhere(&self, subject_id: SubjectId) -> Result<u64, AuthError>;
    async fn list_sessions(&self, subject_id: SubjectId)
    -> Result<Vec<SessionSummary>, AuthError>;
    async fn verify_access(&self, token: &str) -> Result<SubjectId, AuthError>;
}
