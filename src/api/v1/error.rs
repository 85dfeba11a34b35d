use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::warn;
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let code = if let Some(code) = err.find::<ApiErrorCode>() {
        code.clone()
    } else if err.is_not_found() {
        ApiErrorCode::NotFound
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some()
        || err.find::<warp::reject::InvalidQuery>().is_some()
    {
        ApiErrorCode::BadRequest
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiErrorCode::NotFound
    } else {
        ApiErrorCode::internal(format!("Unhandled rejection: {:?}", err))
    };

    let status = code.status();
    let json = warp::reply::json(&ApiResponse::<()>::err(code.clone(), code.to_string()));
    Ok(warp::reply::with_status(json, status))
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Error, Serialize)]
pub enum ApiErrorCode {
    #[error("Token is not valid")]
    InvalidToken,
    #[error("Session is not known")]
    Unauthorized,
    #[error("Refresh token reuse detected, sign in again on every device")]
    CompromisedToken,
    #[error("Session is busy, retry the request")]
    LockTimeout,
    #[error("Service key missing or wrong")]
    Forbidden,
    #[error("Malformed request")]
    BadRequest,
    #[error("Not found")]
    NotFound,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidToken
            | ApiErrorCode::Unauthorized
            | ApiErrorCode::CompromisedToken => StatusCode::UNAUTHORIZED,
            ApiErrorCode::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ApiErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiErrorCode::LockTimeout)
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<AuthError> for ApiErrorCode {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidToken => ApiErrorCode::InvalidToken,
            AuthError::Unauthorized => ApiErrorCode::Unauthorized,
            AuthError::CompromisedToken => ApiErrorCode::CompromisedToken,
            AuthError::LockTimeout => ApiErrorCode::LockTimeout,
            AuthError::Signing(e) => ApiErrorCode::internal(format!("signing: {}", e)),
            AuthError::Store(e) => ApiErrorCode::internal(format!("store: {}", e)),
            AuthError::InternalError(e) => ApiErrorCode::internal(e),
        }
    }
}
