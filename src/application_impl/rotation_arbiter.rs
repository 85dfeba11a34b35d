//! Refresh-token rotation with reuse detection.
//!
//! Every refresh attempt for a session runs under a lease keyed by the session
//! id, so the read-compare-write on the stored hash is linearized. Inside the
//! lease the presented token is compared with the stored hash:
//!
//! * match: a new pair is minted and the stored hash replaced;
//! * mismatch, token younger than the leeway window: a benign race with a
//!   concurrent caller; the latest credentials are served again and nothing
//!   is written;
//! * mismatch, older token: reuse of a superseded token. Every session of the
//!   subject is deleted and the attempt fails with `CompromisedToken`.
//!
//! The lease covers one session only, while revocation spans the whole
//! subject. The rotation write is therefore a compare-and-swap on the hash
//! that was read, and it loses against a concurrent revocation.

use crate::application_impl::{LeaseGuard, LockPolicy};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    pub leeway: Duration,
    pub lock: LockPolicy,
}

/// The pair minted by the latest rotation of a session, kept for one leeway
/// window so a racing caller can be served the same credentials.
struct RecentRotation {
    superseded_hash: String,
    pair: TokenPair,
    rotated_at: DateTime<Utc>,
}

pub fn lock_key(session_id: SessionId) -> String {
    format!("refresh:{}", session_id)
}

pub struct RotationArbiter {
    store: Arc<dyn SessionStore>,
    leases: Arc<dyn LeaseProvider>,
    issuer: Arc<dyn TokenIssuer>,
    hasher: Arc<dyn TokenHasher>,
    clock: Arc<dyn Clock>,
    leeway: chrono::Duration,
    lock: LockPolicy,
    recent: DashMap<SessionId, RecentRotation>,
}

impl RotationArbiter {
    pub fn new(
        store: Arc<dyn SessionStore>,
        leases: Arc<dyn LeaseProvider>,
        issuer: Arc<dyn TokenIssuer>,
        hasher: Arc<dyn TokenHasher>,
        clock: Arc<dyn Clock>,
        cfg: ArbiterConfig,
    ) -> Self {
        Self {
            store,
            leases,
            issuer,
            hasher,
            clock,
            leeway: chrono::Duration::from_std(cfg.leeway).unwrap_or(chrono::Duration::MAX),
            lock: cfg.lock,
            recent: DashMap::new(),
        }
    }

    async fn lock_session(&self, session_id: SessionId) -> Result<LeaseGuard, AuthError> {
        LeaseGuard::acquire(self.leases.clone(), &lock_key(session_id), &self.lock).await
    }

    pub async fn refresh(
        &self,
        session_id: SessionId,
        presented: &str,
    ) -> Result<RefreshOutcome, AuthError> {
        let verified = self.issuer.verify_refresh(presented)?;
        if verified.session_id != session_id {
            warn!(%session_id, token_session = %verified.session_id, "refresh token presented for another session");
            return Err(AuthError::InvalidToken);
        }

        let attempt = RefreshAttempt {
            session_id,
            presented_refresh_token: RefreshToken(presented.to_string()),
            token_issued_at: verified.issued_at,
        };

        let guard = self.lock_session(session_id).await?;
        let outcome = self.arbitrate(&attempt, verified.subject_id).await;
        guard.release().await;
        outcome
    }

    async fn arbitrate(
        &self,
        attempt: &RefreshAttempt,
        subject_from_token: SubjectId,
    ) -> Result<RefreshOutcome, AuthError> {
        let now = self.clock.now();
        let session_id = attempt.session_id;

        let Some(session) = self.store.get(session_id).await? else {
            debug!(%session_id, "refresh for unknown session");
            return Err(AuthError::Unauthorized);
        };

        if session.is_expired(now) {
            debug!(%session_id, "refresh for expired session");
            self.store.delete(session_id).await?;
            self.recent.remove(&session_id);
            return Err(AuthError::Unauthorized);
        }

        // the stored subject is authoritative
        if session.subject_id != subject_from_token {
            warn!(%session_id, "token subject does not match stored session");
            return Err(AuthError::InvalidToken);
        }

        let presented = attempt.presented_refresh_token.0.as_str();
        if self.hasher.verify(presented, &session.refresh_token_hash) {
            return self.rotate(session, now).await.map(RefreshOutcome::Rotated);
        }

        let age = now - attempt.token_issued_at;
        if age < self.leeway {
            debug!(%session_id, age_ms = age.num_milliseconds(), "stale token within leeway");
            return self.reserve(&session, presented, now);
        }

        let subject_id = session.subject_id;
        let revoked = self.store.delete_all_for_subject(subject_id).await?;
        self.recent.remove(&session_id);
        warn!(
            %session_id,
            %subject_id,
            revoked,
            age_secs = age.num_seconds(),
            "refresh token reuse detected, subject sessions revoked"
        );
        Err(AuthError::CompromisedToken)
    }

    async fn rotate(&self, mut session: Session, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let issued = self.issuer.issue(IssueRequest {
            subject_id: session.subject_id,
            session_id: session.session_id,
            claims: &session.claims,
            not_before: Some(session.issued_at),
        })?;
        let new_hash = self.hasher.hash(&issued.pair.refresh_token.0)?;

        let superseded_hash = std::mem::replace(&mut session.refresh_token_hash, new_hash);
        session.issued_at = issued.refresh_issued_at;
        session.expires_at = issued.pair.refresh_token_expires_at;
        // a revocation that landed after our read wins; never resurrect
        if !self.store.replace(&session, &superseded_hash).await? {
            self.recent.remove(&session.session_id);
            warn!(session_id = %session.session_id, "session revoked during rotation");
            return Err(AuthError::Unauthorized);
        }

        self.recent.insert(
            session.session_id,
            RecentRotation {
                superseded_hash,
                pair: issued.pair.clone(),
                rotated_at: now,
            },
        );
        info!(session_id = %session.session_id, "refresh token rotated");
        Ok(issued.pair)
    }

    fn reserve(
        &self,
        session: &Session,
        presented: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome, AuthError> {
        if let Some(recent) = self.recent.get(&session.session_id) {
            let fresh = now - recent.rotated_at < self.leeway;
            let same_race = self.hasher.verify(presented, &recent.superseded_hash);
            let still_live = self
                .hasher
                .verify(&recent.pair.refresh_token.0, &session.refresh_token_hash);
            if fresh && same_race && still_live {
                return Ok(RefreshOutcome::Reserved(recent.pair.clone()));
            }
        }

        let grant = self.issuer.issue_access(session.subject_id, &session.claims)?;
        Ok(RefreshOutcome::AccessOnly(grant))
    }

    /// Deletes the session under its lease so a concurrent rotation cannot
    /// write it back.
    pub async fn end_session(
        &self,
        subject_id: SubjectId,
        session_id: SessionId,
    ) -> Result<(), AuthError> {
        let guard = self.lock_session(session_id).await?;
        let result = self.end_session_locked(subject_id, session_id).await;
        guard.release().await;
        result
    }

    async fn end_session_locked(
        &self,
        subject_id: SubjectId,
        session_id: SessionId,
    ) -> Result<(), AuthError> {
        match self.store.get(session_id).await? {
            Some(session) if session.subject_id == subject_id => {
                self.store.delete(session_id).await?;
                self.recent.remove(&session_id);
                info!(%session_id, "session signed out");
                Ok(())
            }
            _ => Err(AuthError::Unauthorized),
        }
    }

    /// Drops cached rotations older than the leeway window.
    pub fn prune_recent(&self, now: DateTime<Utc>) -> usize {
        let before = self.recent.len();
        self.recent.retain(|_, r| now - r.rotated_at < self.leeway);
        before - self.recent.len()
    }
}
