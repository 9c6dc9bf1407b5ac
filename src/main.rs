//! Medusa search engine server

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use medusa::app::{AppState, build_app};
use medusa::clients::DownloadClients;
use medusa::config::{Config, Settings};
use medusa::db::Database;
use medusa::indexer::ProviderRegistry;
use medusa::jobs;
use medusa::services::{LogNotifier, NotificationService, TvMazeClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medusa=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("Starting Medusa");

    let config = Arc::new(Config::from_env()?);
    let settings = Arc::new(Settings::load(&config.settings_path)?);
    tracing::info!(
        settings = %config.settings_path.display(),
        providers = settings.providers.len(),
        "Configuration loaded"
    );

    let db = Database::connect(&config.database_path).await?;
    tracing::info!(path = %config.database_path.display(), "Database connected");

    let providers = ProviderRegistry::from_config(&settings.providers, settings.search.randomize_providers);
    let clients = DownloadClients::from_settings(&settings.clients)
        .context("Failed to set up download clients")?;
    let notifications = Arc::new(NotificationService::new().with_notifier(Arc::new(LogNotifier)));
    let metadata = Arc::new(TvMazeClient::new(config.tvmaze_url.clone()));

    let state = AppState::new(
        config.clone(),
        settings,
        db,
        providers,
        clients,
        metadata,
        notifications,
    );

    let _scheduler = jobs::start_scheduler(state.clone()).await?;

    let app = build_app(state);

    let addr = config.bind_addr();
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
