//! Libris Server - small library management
//!
//! REST API server for catalog, reservations and loans.

use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use libris_server::{
    api,
    config::{AppConfig, StorageBackend},
    repository::{MemoryStore, PgStore, Store},
    services::{catalog_lookup::GoogleBooksClient, clock::SystemClock, Services},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    init_tracing(&config);

    tracing::info!("Starting Libris Server v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn Store> = match config.database.backend {
        StorageBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .connect(&config.database.url)
                .await?;
            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Database migrations completed");

            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };

    let lookup = Arc::new(GoogleBooksClient::new(config.catalog_lookup.clone())?);
    let services = Services::new(store, lookup, Arc::new(SystemClock), &config);

    if let (Some(email), Some(password)) = (&config.admin.email, &config.admin.password) {
        let full_name = config.admin.full_name.as_deref().unwrap_or("Administrator");
        services.users.ensure_admin(email, full_name, password).await?;
    }

    let sweep_every = config
        .lending
        .sweep_enabled
        .then(|| Duration::from_secs(config.lending.sweep_interval_secs.max(1)));

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };
    let app = api::router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    if let Some(every) = sweep_every {
        state.services.spawn_sweeper(every);
        tracing::info!("Expiry sweep every {:?}", every);
    }

    axum::serve(listener, app).await?;

    Ok(())
}

/// Console logging, human-readable or JSON
fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("libris_server={},tower_http=debug", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
