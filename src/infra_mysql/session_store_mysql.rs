use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use uuid::Uuid;

/// Sessions in the `auth_session` table (see `sql/auth_session.sql`).
pub struct MySqlSessionStore {
    pool: MySqlPool,
}

impl MySqlSessionStore {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlSessionStore { pool }
    }

    #[inline]
    fn uuid_from_bytes(id: &[u8]) -> Result<Uuid, AuthError> {
        Uuid::from_slice(id).map_err(|e| AuthError::Store(e.to_string()))
    }

    fn row_to_session(row: MySqlRow) -> Result<Session, AuthError> {
        let session_id: Vec<u8> = row
            .try_get("session_id")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let subject_id: Vec<u8> = row
            .try_get("subject_id")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let refresh_token_hash: String = row
            .try_get("refresh_token_hash")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let claims: String = row
            .try_get("claims")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let issued_at: DateTime<Utc> = row
            .try_get("issued_at")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let expires_at: DateTime<Utc> = row
            .try_get("expires_at")
            .map_err(|e| AuthError::Store(e.to_string()))?;

        Ok(Session {
            session_id: SessionId(Self::uuid_from_bytes(&session_id)?),
            subject_id: SubjectId(Self::uuid_from_bytes(&subject_id)?),
            refresh_token_hash,
            claims: serde_json::from_str(&claims).map_err(|e| AuthError::Store(e.to_string()))?,
            created_at,
            issued_at,
            expires_at,
        })
    }
}

#[async_trait::async_trait]
impl SessionStore for MySqlSessionStore {
    async fn get(&self, session_id: SessionId) -> Result<Option<Session>, AuthError> {
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT session_id, subject_id, refresh_token_hash, claims, created_at, issued_at, expires_at
FROM auth_session
WHERE session_id = ?
"#,
        )
        .bind(session_id.0.as_bytes().as_slice())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        row_opt.map(Self::row_to_session).transpose()
    }

    async fn put(&self, session: &Session) -> Result<(), AuthError> {
        let claims =
            serde_json::to_string(&session.claims).map_err(|e| AuthError::Store(e.to_string()))?;

        sqlx::query(
            r#"
INSERT INTO auth_session
    (session_id, subject_id, refresh_token_hash, claims, created_at, issued_at, expires_at)
VALUES (?, ?, ?, ?, ?, ?, ?)
ON DUPLICATE KEY UPDATE
    subject_id = VALUES(subject_id),
    refresh_token_hash = VALUES(refresh_token_hash),
    claims = VALUES(claims),
    issued_at = VALUES(issued_at),
    expires_at = VALUES(expires_at)
"#,
        )
        .bind(session.session_id.0.as_bytes().as_slice())
        .bind(session.subject_id.0.as_bytes().as_slice())
        .bind(&session.refresh_token_hash)
        .bind(claims)
        .bind(session.created_at)
        .bind(session.issued_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        Ok(())
    }

    async fn replace(&self, session: &Session, expected_hash: &str) -> Result<bool, AuthError> {
        let claims =
            serde_json::to_string(&session.claims).map_err(|e| AuthError::Store(e.to_string()))?;

        let result = sqlx::query(
            r#"
UPDATE auth_session
SET refresh_token_hash = ?, claims = ?, issued_at = ?, expires_at = ?
WHERE session_id = ? AND subject_id = ? AND refresh_token_hash = ?
"#,
        )
        .bind(&session.refresh_token_hash)
        .bind(claims)
        .bind(session.issued_at)
        .bind(session.expires_at)
        .bind(session.session_id.0.as_bytes().as_slice())
        .bind(session.subject_id.0.as_bytes().as_slice())
        .bind(expected_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        // the hash always changes on rotation, so a matched row is a changed row
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, session_id: SessionId) -> Result<bool, AuthError> {
        let result = sqlx::query("DELETE FROM auth_session WHERE session_id = ?")
            .bind(session_id.0.as_bytes().as_slice())
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_for_subject(&self, subject_id: SubjectId) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM auth_session WHERE subject_id = ?")
            .bind(subject_id.0.as_bytes().as_slice())
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn list_for_subject(&self, subject_id: SubjectId) -> Result<Vec<Session>, AuthError> {
        let rows: Vec<MySqlRow> = sqlx::query(
            r#"
SELECT session_id, subject_id, refresh_token_hash, claims, created_at, issued_at, expires_at
FROM auth_session
WHERE subject_id = ?
ORDER BY created_at
"#,
        )
        .bind(subject_id.0.as_bytes().as_slice())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        rows.into_iter().map(Self::row_to_session).collect()
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM auth_session WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(result.rows_affected())
    }
}
