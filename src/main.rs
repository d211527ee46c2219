//! Canteen42 Commerce API server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use canteen42_commerce::config::AppConfig;
use canteen42_commerce::services::{EventPublisher, HttpSupplierApi, JwtIdentityProvider, PaymentProviders};
use canteen42_commerce::store::{DocumentStore, MemoryStore, PgDocumentStore};
use canteen42_commerce::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    info!(port = config.port, "Configuration loaded");

    let store: Arc<dyn DocumentStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let store = PgDocumentStore::new(pool);
            store.migrate().await?;
            info!("Connected to PostgreSQL, migrations complete");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => {
                info!("Connected to NATS");
                Some(client)
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect to NATS, continuing without events");
                None
            }
        },
        None => None,
    };
    let events = EventPublisher::new(nats);
    info!(enabled = events.is_enabled(), "Event publishing configured");

    let identity = Arc::new(JwtIdentityProvider::from_config(&config.auth)?);
    let payments = PaymentProviders::from_config(&config)?;
    info!(providers = ?payments.kinds(), "Payment providers ready");
    let suppliers = Arc::new(HttpSupplierApi::new(Duration::from_secs(config.http_timeout_secs))?);

    let port = config.port;
    let state = AppState::new(config, store, identity, payments, suppliers, events);
    let app = canteen42_commerce::app(state);

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Canteen42 Commerce listening on {}", listener.local_addr()?);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
