//! # User Service API Server
//!
//! Registration, login/logout and user management over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! JWT_SECRET=$(openssl rand -hex 32) STORAGE_BACKEND=memory cargo run -p usersvc-api
//! ```

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use usersvc_api::app::{build_router, AppState};
use usersvc_api::config::{Config, StorageBackend};
use usersvc_shared::cache::{InMemoryCache, SessionCache};
use usersvc_shared::db::{migrations, pool};
use usersvc_shared::redis::{RedisClient, RedisConfig};
use usersvc_shared::store::{CredentialStore, InMemoryCredentialStore, PgCredentialStore};
use usersvc_shared::telemetry::{CollectorSink, LogSink, SpanSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "usersvc_api=debug,usersvc_shared=debug,tower_http=debug".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    tracing::info!("User Service v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let mut db_pool = None;
    let (store, cache): (Arc<dyn CredentialStore>, Arc<dyn SessionCache>) = match config.backend {
        StorageBackend::Postgres => {
            let pool = pool::create_pool(pool::DatabaseConfig {
                url: config.database.url.clone(),
                max_connections: config.database.max_connections,
                ..Default::default()
            })
            .await?;
            migrations::run_migrations(&pool).await?;

            let redis = RedisClient::new(RedisConfig {
                url: config.redis.url.clone(),
                command_timeout_secs: config.backend_timeout_secs,
                ..Default::default()
            })
            .await?;

            db_pool = Some(pool.clone());
            let store: Arc<dyn CredentialStore> = Arc::new(PgCredentialStore::new(pool));
            let cache: Arc<dyn SessionCache> = Arc::new(redis);
            (store, cache)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; accounts are lost on restart");
            let store: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
            let cache: Arc<dyn SessionCache> = Arc::new(InMemoryCache::new());
            (store, cache)
        }
    };

    let sink: Arc<dyn SpanSink> = match &config.jaeger_endpoint {
        Some(endpoint) => {
            tracing::info!(endpoint = %endpoint, "Exporting spans to trace collector");
            Arc::new(CollectorSink::new(endpoint)?)
        }
        None => Arc::new(LogSink),
    };

    let bind_address = config.bind_address();
    let app = build_router(AppState::new(config, store, cache, sink));

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = db_pool {
        pool::close_pool(pool).await;
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining requests...");
}
