use super::error::*;
use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                retryable: code.is_retryable(),
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub subject_id: SubjectId,
    #[serde(default)]
    pub claims: CustomClaims,
}

pub async fn start_session(
    body: StartSessionRequest,
    session_service: Arc<dyn SessionService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let pair = session_service
        .start_session(body.subject_id, body.claims)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(pair)))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub session_id: SessionId,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub outcome: &'static str,
    pub session_id: SessionId,
    pub access_token: AccessToken,
    pub access_token_expires_at: DateTime<Utc>,
    /// Absent when only a new access token was handed out; the client keeps
    /// the refresh token it obtained from the concurrent request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
}

impl RefreshResponse {
    fn new(session_id: SessionId, outcome: RefreshOutcome) -> Self {
        let kind = outcome.kind();
        match outcome {
            RefreshOutcome::Rotated(pair) | RefreshOutcome::Reserved(pair) => RefreshResponse {
                outcome: kind,
                session_id: pair.session_id,
                access_token: pair.access_token,
                access_token_expires_at: pair.access_token_expires_at,
                refresh_token: Some(pair.refresh_token),
                refresh_token_expires_at: Some(pair.refresh_token_expires_at),
            },
            RefreshOutcome::AccessOnly(grant) => RefreshResponse {
                outcome: kind,
                session_id,
                access_token: grant.access_token,
                access_token_expires_at: grant.access_token_expires_at,
                refresh_token: None,
                refresh_token_expires_at: None,
            },
        }
    }
}

pub async fn refresh(
    body: RefreshRequest,
    session_service: Arc<dyn SessionService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let outcome = session_service
        .refresh(body.session_id, &body.refresh_token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let response = RefreshResponse::new(body.session_id, outcome);
    Ok(warp::reply::json(&ApiResponse::ok(response)))
}

#[derive(Debug, Deserialize)]
pub struct SignOutRequest {
    pub session_id: SessionId,
}

#[derive(Debug, Serialize)]
pub struct SignOutResponse {
    pub revoked: u64,
}

pub async fn sign_out(
    body: SignOutRequest,
    subject_id: SubjectId,
    session_service: Arc<dyn SessionService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    session_service
        .sign_out(subject_id, body.session_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(SignOutResponse { revoked: 1 })))
}

pub async fn sign_out_all(
    subject_id: SubjectId,
    session_service: Arc<dyn SessionService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let revoked = session_service
        .sign_out_everywhere(subject_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(SignOutResponse { revoked })))
}

pub async fn list_sessions(
    subject_id: SubjectId,
    session_service: Arc<dyn SessionService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let sessions = session_service
        .list_sessions(subject_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(sessions)))
}
