use balloon_sync::api_client::ReqwestHistoryFetcher;
use balloon_sync::config::SyncConfig;
use balloon_sync::domain::repository::load_state;
use balloon_sync::infra::sqlite::repo::SqliteCacheStore;
use balloon_sync::routes::{AppState, router, spawn_sync};
use balloon_sync::usecases::sync_service::SyncService;
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::error::Error;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const AUTO_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SyncConfig::from_env()?;

    let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    if let Some(dir) = options.get_filename().parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;
    let cache = SqliteCacheStore::new(pool);
    cache.migrate().await?;

    let fetcher = ReqwestHistoryFetcher::new(&config)?;
    let port = config.port;
    let service = Arc::new(SyncService::new(Arc::new(fetcher), Arc::new(cache), config));

    tokio::spawn(auto_sync(service.clone()));

    let app = router(AppState { service });
    serve(app, port).await;
    Ok(())
}

// Starts a recent-window sync whenever the cached snapshot goes stale
async fn auto_sync(service: Arc<SyncService>) {
    let mut ticker = tokio::time::interval(AUTO_SYNC_INTERVAL);
    loop {
        ticker.tick().await;
        let state = match load_state(service.cache()).await {
            Ok(s) => s.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Auto sync skipped, cache unreadable");
                continue;
            }
        };
        if !state.settings.auto_sync || service.is_running() || !service.should_sync().await {
            continue;
        }
        let full = state.data.is_none() && state.settings.full_sync_on_first_run;
        info!(full, "Starting auto sync");
        spawn_sync(service.clone(), full);
    }
}

async fn serve(app: Router, port: u16) {
    // Try to bind to the requested port; if it's in use, try a few subsequent ports.
    let max_attempts = 10;
    for offset in 0..max_attempts {
        let try_port = port + offset;
        let addr = SocketAddr::from(([127, 0, 0, 1], try_port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => {
                info!(%addr, "Listening");
                if let Err(e) = axum::serve(listener, app).await {
                    error!(error = %e, "Server failed while serving");
                }
                return;
            }
            Err(e) => {
                warn!(port = try_port, error = %e, "Port unavailable, trying next");
            }
        }
    }
    error!("Failed to bind to any port in range {}..{}", port, port + max_attempts - 1);
}
