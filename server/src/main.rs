use axum::Router;
use miette::{IntoDiagnostic, Result};
use oauth1_provider::{Consumer, HeaderUserAuthenticator, OAuthProvider, Resource};
use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod api;
mod settings;
mod store;

use settings::Settings;
use store::SqliteStore;

/// Consumers and resources to register at startup.
#[derive(Debug, Default, Deserialize)]
struct Seed {
    #[serde(default)]
    consumers: Vec<Consumer>,
    #[serde(default)]
    resources: Vec<Resource>,
}

async fn init_db(db_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_url)
        .into_diagnostic()?
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await.into_diagnostic()?;

    let migration_sql = include_str!("../migrations/001_oauth_schema.sql");
    sqlx::raw_sql(migration_sql)
        .execute(&pool)
        .await
        .into_diagnostic()?;

    Ok(pool)
}

async fn load_seed(store: &SqliteStore, path: &Path) -> Result<()> {
    let contents = tokio::fs::read_to_string(path).await.into_diagnostic()?;
    let seed: Seed = serde_json::from_str(&contents).into_diagnostic()?;

    for resource in &seed.resources {
        store.upsert_resource(resource).await.into_diagnostic()?;
    }
    for consumer in &seed.consumers {
        store.upsert_consumer(consumer).await.into_diagnostic()?;
    }

    tracing::info!(
        consumers = seed.consumers.len(),
        resources = seed.resources.len(),
        path = %path.display(),
        "loaded seed file"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env().into_diagnostic()?;
    let pool = init_db(&settings.database_url).await?;
    let store = Arc::new(SqliteStore::new(pool));

    if let Some(path) = &settings.seed_file {
        load_seed(&store, path).await?;
    }

    let provider = OAuthProvider::builder()
        .config(settings.provider.clone())
        .store(store)
        .user_authenticator(Arc::new(HeaderUserAuthenticator::default()))
        .build()
        .into_diagnostic()?;

    let tokens = provider.tokens().clone();
    let period = settings.sweep_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = tokens.sweep(chrono::Utc::now()).await {
                tracing::error!(error = %e, "sweep failed");
            }
        }
    });

    let app = Router::new()
        .merge(provider.router())
        .merge(provider.protect(api::router()))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .into_diagnostic()?;
    tracing::info!(
        addr = %settings.bind_addr,
        host = %settings.provider.host,
        methods = %settings.provider.signature_methods_header(),
        "OAuth provider listening"
    );
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}
