use std::sync::Arc;

use anyhow::Context;
use bus_tracking::api::{self, AppState};
use bus_tracking::config::Config;
use bus_tracking::store::{BusStore, MemoryBusStore, PostgresBusStore};
use bus_tracking::sweeper;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();

    let store: Arc<dyn BusStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresBusStore::connect(url, config.db_pool_size)
                .await
                .context("failed to connect to the database")?;
            store.migrate().await.context("failed to migrate the database")?;
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL is not set, using the in-memory store");
            Arc::new(MemoryBusStore::new())
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = config.sweep_interval().map(|every| {
        sweeper::spawn(store.clone(), config.retention(), every, shutdown_rx)
    });

    let app = api::router(AppState::new(store, config.retention()));

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;

    info!("Server is running on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    shutdown_tx.send_replace(true);
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            error!("Retention sweeper panicked: {}", e);
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Failed to listen for the shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
