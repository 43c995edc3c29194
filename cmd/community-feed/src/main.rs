//! # community-feed
//!
//! Loads settings, wires the storage backend, the JWT verifier and the feed
//! engine together, and serves the HTTP API until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use api_adapters::{router, AppState};
use auth_adapters::JwtVerifier;
use configs::{DatabaseSettings, FeedSettings, LogFormat, LogSettings, Settings, StorageBackend};
use domains::{FeedRepository, ScoreParams, ScoreWeights, SystemClock, UserDirectory};
use secrecy::ExposeSecret;
use services::{FeedConfig, FeedService};
use storage_adapters::MemoryStore;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

type Stores = (Arc<dyn FeedRepository>, Arc<dyn UserDirectory>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings.log);
    info!(
        environment = %settings.environment,
        backend = ?settings.database.backend,
        "configuration loaded"
    );

    let (repo, users) = storage(&settings.database).await?;
    let feeds = FeedService::new(repo, users, Arc::new(SystemClock), feed_config(&settings.feed));
    let tokens = Arc::new(JwtVerifier::new(
        settings.auth.jwt_secret.expose_secret().as_bytes(),
    ));
    let state = AppState::new(feeds, tokens, &settings.auth.cookie_name);

    let addr = settings.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    info!("stopped");
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    // RUST_LOG wins over the configured filter.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let registry = tracing_subscriber::registry().with(filter);
    match log.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

fn feed_config(feed: &FeedSettings) -> FeedConfig {
    FeedConfig {
        top_communities: feed.top_communities,
        default_limit: feed.default_limit,
        max_limit: feed.max_limit,
        query_timeout: feed.query_timeout(),
        score: ScoreParams {
            weights: ScoreWeights {
                like: feed.like_weight,
                comment: feed.comment_weight,
                bookmark: feed.bookmark_weight,
            },
            min_age_minutes: feed.min_age_minutes,
        },
    }
}

async fn storage(db: &DatabaseSettings) -> anyhow::Result<Stores> {
    match db.backend {
        StorageBackend::Memory => {
            warn!("using the in-memory store; it starts empty and nothing is persisted");
            let store = Arc::new(MemoryStore::new());
            let repo: Arc<dyn FeedRepository> = store.clone();
            let users: Arc<dyn UserDirectory> = store;
            Ok((repo, users))
        }
        StorageBackend::Postgres => postgres(db).await,
    }
}

#[cfg(feature = "db-postgres")]
async fn postgres(db: &DatabaseSettings) -> anyhow::Result<Stores> {
    use storage_adapters::postgres::{
        connect, migrate, PgFeedRepository, PgPoolConfig, PgUserDirectory,
    };

    let url = db.url.as_ref().context("database.url is not set")?;
    let pool = connect(
        url.expose_secret(),
        &PgPoolConfig {
            max_connections: db.max_connections,
            min_connections: db.min_connections,
            acquire_timeout: db.acquire_timeout(),
        },
    )
    .await?;
    if db.run_migrations {
        migrate(&pool).await?;
        info!("migrations applied");
    }

    let repo: Arc<dyn FeedRepository> = Arc::new(PgFeedRepository::new(pool.clone()));
    let users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(pool));
    Ok((repo, users))
}

#[cfg(not(feature = "db-postgres"))]
async fn postgres(_db: &DatabaseSettings) -> anyhow::Result<Stores> {
    anyhow::bail!("built without db-postgres; set database.backend = \"memory\"")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
