use crate::domain_model::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Application-defined claims carried by every access token of a session.
pub type CustomClaims = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub session_id: SessionId,
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessGrant {
    pub access_token: AccessToken,
    pub access_token_expires_at: DateTime<Utc>,
}

/// Context of a single refresh attempt; lives for one arbiter invocation.
#[derive(Debug, Clone)]
pub struct RefreshAttempt {
    pub session_id: SessionId,
    pub presented_refresh_token: RefreshToken,
    pub token_issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The session hash moved on to the returned refresh token.
    Rotated(TokenPair),
    /// A concurrent caller rotated moments ago; its pair is served again.
    Reserved(TokenPair),
    /// A concurrent caller rotated moments ago but its pair is not known
    /// here, so only a fresh access token is handed out.
    AccessOnly(AccessGrant),
}

impl RefreshOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            RefreshOutcome::Rotated(_) => "rotated",
            RefreshOutcome::Reserved(_) => "reserved",
            RefreshOutcome::AccessOnly(_) => "access_only",
        }
    }

    pub fn access_token(&self) -> &AccessToken {
        match self {
            RefreshOutcome::Rotated(pair) | RefreshOutcome::Reserved(pair) => &pair.access_token,
            RefreshOutcome::AccessOnly(grant) => &grant.access_token,
        }
    }

    pub fn is_mutating(&self) -> bool {
        matches!(self, RefreshOutcome::Rotated(_))
    }
}
