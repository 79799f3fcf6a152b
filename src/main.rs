// commit-streak: GitHub commit streak statistics with grace days.
// Wires config, the GitHub client, the cache store, and the HTTP endpoint together.

mod cache;
mod config;
mod contributions;
mod error;
mod github;
mod server;
mod streak;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cache::{ContributionCache, FileStore};
use config::Config;
use error::{Result, StreakError};
use github::GitHubClient;
use server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    let client = GitHubClient::with_options(
        &config.github_token,
        &config.graphql_url,
        config.fetch_timeout,
    )?;

    let store = FileStore::open(&config.cache_dir).await?;
    info!("Cache directory: {}", store.root().display());

    let cache = ContributionCache::new(Arc::new(store), Arc::new(client), config.freshness_window);
    let app = server::router(Arc::new(AppState { cache }));

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(StreakError::Server)?;
    info!("Listening on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(StreakError::Server)?;

    info!("Server stopped");
    Ok(())
}

fn init_tracing() {
    let log_format = std::env::var("STREAK_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
