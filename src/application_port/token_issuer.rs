use crate::application_port::AuthError;
use crate::domain_model::*;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct IssueRequest<'a> {
    pub subject_id: SubjectId,
    pub session_id: SessionId,
    pub claims: &'a CustomClaims,
    /// Issuance instant of the predecessor refresh token, if any. The new
    /// refresh token is always issued strictly after it.
    pub not_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct IssuedPair {
    pub pair: TokenPair,
    pub refresh_issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VerifiedRefresh {
    pub subject_id: SubjectId,
    pub session_id: SessionId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub jti: String,
}

/// Mints and verifies signed tokens. Access tokens never carry the session id.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, request: IssueRequest<'_>) -> Result<IssuedPair, AuthError>;
    fn issue_access(
        &self,
        subject_id: SubjectId,
        claims: &CustomClaims,
    ) -> Result<AccessGrant, AuthError>;
    fn verify_refresh(&self, token: &str) -> Result<VerifiedRefresh, AuthError>;
    fn verify_access(&self, token: &str) -> Result<SubjectId, AuthError>;
}

/// One-way keyed hash for refresh tokens at rest.
pub trait TokenHasher: Send + Sync {
    fn hash(&self, token: &str) -> Result<String, AuthError>;
    fn verify(&self, token: &str, hash_hex: &str) -> bool;
}
