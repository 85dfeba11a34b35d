/// Walks one subject through the refresh-token lifecycle against the backends
/// named in the settings file.
///
/// $ SESSIONGUARD_SIGNING_KEY=dev SESSIONGUARD_SERVICE_KEY=dev \
///   cargo run --bin rotation_demo -- --settings=settings/dev.toml
///
/// The demo drives a manual clock so reuse detection can be shown without
/// waiting out the leeway window.
use chrono::Utc;
use futures_util::future::join_all;
use sessionguard::application_port::AuthError;
use sessionguard::domain_model::SubjectId;
use sessionguard::infra_local::ManualClock;
use sessionguard::logger::*;
use sessionguard::server::Server;
use sessionguard::settings::*;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    logger.reload_from_config(&LogConfig::from(&project_settings.log))?;
    let secrets = Secrets::from_env(&project_settings)?;

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let server = Server::with_clock(&project_settings, secrets, clock.clone()).await?;
    let service = server.session_service.clone();

    let subject = SubjectId(uuid::Uuid::new_v4());
    let mut claims = serde_json::Map::new();
    claims.insert("role".to_string(), serde_json::json!("demo"));

    // region sign in
    let first = service.start_session(subject, claims).await?;
    info!(session_id = %first.session_id, "session started");
    let verified = service.verify_access(&first.access_token.0).await?;
    info!(%verified, "access token verified");
    // endregion

    // region racing refreshes with the same token
    clock.advance(chrono::Duration::seconds(1));
    let attempts = (0..4).map(|_| service.refresh(first.session_id, &first.refresh_token.0));
    let outcomes = join_all(attempts).await;
    for outcome in &outcomes {
        match outcome {
            Ok(outcome) => info!(outcome = outcome.kind(), "refresh attempt"),
            Err(e) => warn!("refresh attempt failed: {}", e),
        }
    }
    // endregion

    // region reuse after the leeway window
    clock.advance(chrono::Duration::seconds(
        project_settings.token.leeway_secs as i64 * 2,
    ));
    match service.refresh(first.session_id, &first.refresh_token.0).await {
        Err(AuthError::CompromisedToken) => info!("stale token replay rejected"),
        other => warn!("unexpected replay result: {:?}", other),
    }
    let left = service.list_sessions(subject).await?;
    info!(sessions = left.len(), "sessions left after reuse detection");
    // endregion

    // region sign out everywhere
    let a = service.start_session(subject, Default::default()).await?;
    let b = service.start_session(subject, Default::default()).await?;
    info!(a = %a.session_id, b = %b.session_id, "two sessions started");
    let revoked = service.sign_out_everywhere(subject).await?;
    info!(revoked, "signed out everywhere");
    // endregion

    server.shutdown().await;
    Ok(())
}
