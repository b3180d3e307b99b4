use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use guestlist_server::config::Config;
use guestlist_server::connectivity::ConnectivityMonitor;
use guestlist_server::jobs::{ExpirationJob, ExpirationScheduler};
use guestlist_server::routes::create_routes;
use guestlist_server::store::{EventStore, PgEventStore};
use guestlist_server::uploads::{ImageStorage, LocalImageStorage};
use guestlist_server::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("guestlist_server=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let pg = PgEventStore::connect(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Successfully connected to database");

    pg.migrate().await?;
    tracing::info!("Migrations run successfully");

    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let store: Arc<dyn EventStore> = Arc::new(pg);
    let images: Arc<dyn ImageStorage> = Arc::new(LocalImageStorage::new(
        config.upload_dir.clone(),
        config.public_upload_url.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor = Arc::new(ConnectivityMonitor::new(
        store.clone(),
        config.connectivity_timeout,
    ));
    let connection = monitor.subscribe();
    let monitor_task = monitor.spawn(config.connectivity_interval, shutdown_rx.clone());

    let expiration_task = ExpirationScheduler::new(
        ExpirationJob::new(store.clone(), config.expiration_scan_limit),
        config.expiration_interval,
    )
    .spawn(shutdown_rx);

    let state = AppState::new(store, images, connection, &config);
    let app = create_routes(state, &config);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server running at http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = tokio::join!(monitor_task, expiration_task);
    tracing::info!("Server stopped");
    Ok(())
}
