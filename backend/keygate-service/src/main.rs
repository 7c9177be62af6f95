/// Keygate Service - HTTP Server
use actix_middleware::{CorrelationIdMiddleware, Logging};
use actix_web::{App, HttpServer};
use anyhow::Context;
use shared_store::{RedisStore, SharedStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use keygate_service::config::{Config, LogFormat};
use keygate_service::db::{MemoryUserRepository, PgUserRepository, UserRepository};
use keygate_service::{domain_validator_from_config, email_sender_from_config, http, AppState};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!(?config, "Starting Keygate service");

    let store: Arc<dyn SharedStore> = Arc::new(
        RedisStore::connect(&config.redis_store_config())
            .await
            .context("failed to connect to Redis")?,
    );

    let users: Arc<dyn UserRepository> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .context("failed to connect to database")?;
            MIGRATOR
                .run(&pool)
                .await
                .context("failed to run database migrations")?;
            tracing::info!("Database connection pool initialized");
            Arc::new(PgUserRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; accounts are kept in memory");
            Arc::new(MemoryUserRepository::new())
        }
    };

    let email = email_sender_from_config(&config)?;
    let domains = domain_validator_from_config(&config)?;
    let state = AppState::new(&config, store, users, email, domains)?;
    let bind_address = config.bind_address();

    tracing::info!(%bind_address, "HTTP server listening");

    HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(Logging)
            .wrap(CorrelationIdMiddleware)
            .configure(|cfg| http::configure(cfg, &state))
    })
    .bind(&bind_address)
    .with_context(|| format!("failed to bind {bind_address}"))?
    .run()
    .await
    .context("HTTP server error")?;

    tracing::info!("Keygate service shut down");
    Ok(())
}
