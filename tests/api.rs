use chrono::Utc;
use serde_json::{Value, json};
use sessionguard::api;
use sessionguard::infra_local::ManualClock;
use sessionguard::server::Server;
use sessionguard::settings::*;
use std::sync::Arc;
use warp::Filter;
use warp::http::StatusCode;

const SERVICE_KEY: &str = "test-service-key";

fn memory_settings() -> Settings {
    Settings {
        http: Http {
            address: "127.0.0.1:0".to_string(),
            tls: None,
        },
        log: Log {
            filter: "info".to_string(),
        },
        token: Token {
            issuer: "sessionguard.test".to_string(),
            audience: "test-client".to_string(),
            algorithm: "HS256".to_string(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            leeway_secs: 60,
            signing_key_env: "UNUSED".to_string(),
            hash_key_env: None,
        },
        lock: Lock {
            backend: "local".to_string(),
            lease_ttl_ms: 5000,
            retry_base_ms: 2,
            retry_max_ms: 20,
            timeout_ms: 300,
        },
        store: Store {
            backend: "memory".to_string(),
            redis_dsn: None,
            mysql_dsn: None,
            prefix: "test".to_string(),
            sweep_interval_secs: 60,
        },
        service: Service {
            key_env: "UNUSED".to_string(),
        },
    }
}

fn secrets() -> Secrets {
    Secrets {
        signing_key: b"api-test-signing-key".to_vec(),
        hash_key: b"api-test-hash-key".to_vec(),
        service_key: SERVICE_KEY.to_string(),
    }
}

async fn server(clock: Arc<ManualClock>) -> Arc<Server> {
    Arc::new(
        Server::with_clock(&memory_settings(), secrets(), clock)
            .await
            .unwrap(),
    )
}

fn filter(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone {
    api::v1::routes(server).recover(api::v1::recover_error)
}

fn body(response: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
    serde_json::from_slice(response.body()).unwrap()
}

async fn start(server: &Arc<Server>, subject: &str) -> Value {
    let response = warp::test::request()
        .method("POST")
        .path("/session")
        .header(api::v1::SERVICE_KEY_HEADER, SERVICE_KEY)
        .json(&json!({ "subject_id": subject, "claims": { "role": "reader" } }))
        .reply(&filter(server.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    body(&response)["data"].clone()
}

async fn refresh(server: &Arc<Server>, session_id: &Value, token: &Value) -> (StatusCode, Value) {
    let response = warp::test::request()
        .method("POST")
        .path("/refresh")
        .json(&json!({ "session_id": session_id, "refresh_token": token }))
        .reply(&filter(server.clone()))
        .await;
    (response.status(), body(&response))
}

fn subject() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[tokio::test]
async fn start_session_requires_the_service_key() {
    let server = server(Arc::new(ManualClock::new(Utc::now()))).await;

    let missing = warp::test::request()
        .method("POST")
        .path("/session")
        .json(&json!({ "subject_id": subject() }))
        .reply(&filter(server.clone()))
        .await;
    assert_eq!(missing.status(), StatusCode::FORBIDDEN);
    assert_eq!(body(&missing)["error"]["code"], "Forbidden");

    let wrong = warp::test::request()
        .method("POST")
        .path("/session")
        .header(api::v1::SERVICE_KEY_HEADER, "nope")
        .json(&json!({ "subject_id": subject() }))
        .reply(&filter(server.clone()))
        .await;
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    server.shutdown().await;
}

#[tokio::test]
async fn refresh_rotates_then_serves_the_race_loser() {
    let server = server(Arc::new(ManualClock::new(Utc::now()))).await;
    let pair = start(&server, &subject()).await;

    let (status, rotated) = refresh(&server, &pair["session_id"], &pair["refresh_token"]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rotated["success"], true);
    assert_eq!(rotated["data"]["outcome"], "rotated");
    assert_eq!(rotated["data"]["session_id"], pair["session_id"]);
    assert_ne!(rotated["data"]["refresh_token"], pair["refresh_token"]);

    let (status, late) = refresh(&server, &pair["session_id"], &pair["refresh_token"]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(late["data"]["outcome"], "reserved");
    assert_eq!(late["data"]["refresh_token"], rotated["data"]["refresh_token"]);

    server.shutdown().await;
}

#[tokio::test]
async fn stale_replay_is_unauthorized_and_revokes() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let server = server(clock.clone()).await;
    let pair = start(&server, &subject()).await;

    let (_, rotated) = refresh(&server, &pair["session_id"], &pair["refresh_token"]).await;
    clock.advance(chrono::Duration::seconds(120));

    let (status, replay) = refresh(&server, &pair["session_id"], &pair["refresh_token"]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay["success"], false);
    assert_eq!(replay["error"]["code"], "CompromisedToken");
    assert_eq!(replay["error"]["retryable"], false);

    let (status, after) =
        refresh(&server, &pair["session_id"], &rotated["data"]["refresh_token"]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(after["error"]["code"], "Unauthorized");

    server.shutdown().await;
}

#[tokio::test]
async fn garbage_token_and_bad_body_are_rejected() {
    let server = server(Arc::new(ManualClock::new(Utc::now()))).await;

    let (status, invalid) = refresh(
        &server,
        &json!(uuid::Uuid::new_v4().to_string()),
        &json!("not-a-jwt"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(invalid["error"]["code"], "InvalidToken");

    let malformed = warp::test::request()
        .method("POST")
        .path("/refresh")
        .json(&json!({ "refresh_token": 42 }))
        .reply(&filter(server.clone()))
        .await;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    let unknown = warp::test::request()
        .method("GET")
        .path("/nowhere")
        .reply(&filter(server.clone()))
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    server.shutdown().await;
}

#[tokio::test]
async fn bearer_routes_list_and_sign_out() {
    let server = server(Arc::new(ManualClock::new(Utc::now()))).await;
    let subject = subject();
    let first = start(&server, &subject).await;
    let second = start(&server, &subject).await;
    let bearer = format!("Bearer {}", first["access_token"].as_str().unwrap());

    let unauthenticated = warp::test::request()
        .method("GET")
        .path("/sessions")
        .reply(&filter(server.clone()))
        .await;
    assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);

    let listed = warp::test::request()
        .method("GET")
        .path("/sessions")
        .header("authorization", &bearer)
        .reply(&filter(server.clone()))
        .await;
    assert_eq!(listed.status(), StatusCode::OK);
    assert_eq!(body(&listed)["data"].as_array().unwrap().len(), 2);

    let signed_out = warp::test::request()
        .method("POST")
        .path("/sign_out")
        .header("authorization", &bearer)
        .json(&json!({ "session_id": second["session_id"] }))
        .reply(&filter(server.clone()))
        .await;
    assert_eq!(signed_out.status(), StatusCode::OK);
    assert_eq!(body(&signed_out)["data"]["revoked"], 1);

    let everywhere = warp::test::request()
        .method("POST")
        .path("/sign_out_all")
        .header("authorization", &bearer)
        .reply(&filter(server.clone()))
        .await;
    assert_eq!(everywhere.status(), StatusCode::OK);
    assert_eq!(body(&everywhere)["data"]["revoked"], 1);

    let (status, _) = refresh(&server, &first["session_id"], &first["refresh_token"]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    server.shutdown().await;
}

#[tokio::test]
async fn server_refuses_a_zero_lease_ttl() {
    let mut settings = memory_settings();
    settings.lock.lease_ttl_ms = 0;

    let result =
        Server::with_clock(&settings, secrets(), Arc::new(ManualClock::new(Utc::now()))).await;
    assert!(result.is_err());
}
