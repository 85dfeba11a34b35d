use super::error::*;
use super::handler;
use crate::application_port::SessionService;
use crate::domain_model::SubjectId;
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, http, reject};

pub const SERVICE_KEY_HEADER: &str = "x-service-key";

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let service = server.session_service.clone();

    let start_session = warp::post()
        .and(warp::path("session"))
        .and(warp::path::end())
        .and(with_service_key(server.service_key.clone()))
        .and(warp::body::json())
        .and(with(service.clone()))
        .and_then(handler::start_session);

    let refresh = warp::post()
        .and(warp::path("refresh"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(with(service.clone()))
        .and_then(handler::refresh);

    let sign_out = warp::post()
        .and(warp::path("sign_out"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(with_verification(service.clone()))
        .and(with(service.clone()))
        .and_then(handler::sign_out);

    let sign_out_all = warp::post()
        .and(warp::path("sign_out_all"))
        .and(warp::path::end())
        .and(with_verification(service.clone()))
        .and(with(service.clone()))
        .and_then(handler::sign_out_all);

    let sessions = warp::get()
        .and(warp::path("sessions"))
        .and(warp::path::end())
        .and(with_verification(service.clone()))
        .and(with(service))
        .and_then(handler::list_sessions);

    start_session
        .or(refresh)
        .or(sign_out)
        .or(sign_out_all)
        .or(sessions)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn with_verification(
    session_service: Arc<dyn SessionService>,
) -> impl Filter<Extract = (SubjectId,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>(http::header::AUTHORIZATION.as_ref()).and_then(
        move |header: Option<String>| {
            let session_service = session_service.clone();
            async move {
                let token = header
                    .as_deref()
                    .and_then(|h| h.strip_prefix("Bearer "))
                    .ok_or_else(|| reject::custom(ApiErrorCode::InvalidToken))?;
                let subject_id = session_service
                    .verify_access(token)
                    .await
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                Ok::<_, warp::Rejection>(subject_id)
            }
        },
    )
}

fn with_service_key(
    expected: Arc<str>,
) -> impl Filter<Extract = (), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>(SERVICE_KEY_HEADER)
        .and_then(move |provided: Option<String>| {
            let expected = expected.clone();
            async move {
                match provided {
                    Some(key) if keys_match(key.as_bytes(), expected.as_bytes()) => Ok(()),
                    _ => Err(reject::custom(ApiErrorCode::Forbidden)),
                }
            }
        })
        .untuple_one()
}

fn keys_match(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
