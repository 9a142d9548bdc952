use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod access;
mod api;
mod auth;
mod config;
mod dispatcher;
mod error;
mod evidence;
mod face_client;

use api::AppState;
use config::Config;
use dispatcher::{spawn_dispatcher, Dispatcher};
use evidence::EvidenceDir;
use face_client::FaceClient;
use facegate_core::secret::SecretBox;
use facegate_store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facegated starting");

    let config = Config::load()?;

    let store = Store::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;
    store.seed_catalogs().await?;

    let face = FaceClient::new(&config.face_service_url, config.face_service_timeout_secs)
        .context("failed to build face service client")?;
    match face.health().await {
        Ok(()) => tracing::info!(url = %config.face_service_url, "face service reachable"),
        Err(e) => tracing::warn!(url = %config.face_service_url, error = %e, "face service unreachable"),
    }

    let secrets = SecretBox::new(config.camera_secret()).context("failed to set up camera secret")?;
    let evidence = EvidenceDir::new(config.evidence_dir.clone());

    let http = reqwest::Client::builder()
        .user_agent(concat!("facegated/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .context("failed to build notification client")?;
    let dispatcher = spawn_dispatcher(Dispatcher::new(store.clone(), http, &config.notify_webhook_url));

    let listen = config.listen;
    let state = Arc::new(AppState {
        store,
        config,
        face,
        dispatcher,
        evidence,
        secrets,
    });

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    tracing::info!(%listen, "facegated ready");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facegated shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
}
