//! # configs
//!
//! Application settings, loaded once at startup and passed down explicitly.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `config/default.toml` (optional)
//! 3. `config/{APP_ENV}.toml` (optional)
//! 4. environment variables `APP__SECTION__KEY`, e.g. `APP__FEED__TOP_COMMUNITIES=5`
//!
//! A `.env` file in the working directory is read first, if present.

use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Value of `APP_ENV`, `development` when unset.
    pub environment: String,
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub feed: FeedSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    /// Process-local store, empty at startup. Refused in `production`.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub backend: StorageBackend,
    /// Required for the postgres backend.
    pub url: Option<SecretString>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub run_migrations: bool,
}

impl DatabaseSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: SecretString,
    /// Cookie that carries the JWT; `Authorization: Bearer` is accepted too.
    pub cookie_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSettings {
    /// N of the top-N communities that bound the user and global feeds.
    pub top_communities: u32,
    pub default_limit: u32,
    pub max_limit: u32,
    pub query_timeout_ms: u64,
    pub min_age_minutes: f64,
    pub like_weight: f64,
    pub comment_weight: f64,
    pub bookmark_weight: f64,
}

impl FeedSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info,sqlx=warn`.
    pub filter: String,
    pub format: LogFormat,
}

impl Settings {
    /// Loads `.env`, the config files and the environment, then validates.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());

        let config = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override("environment", env)?
            .build()?;

        Self::from_config(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Builder pre-filled with every default. Secrets have none.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("environment", "development")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080_i64)?
            .set_default("database.backend", "postgres")?
            .set_default("database.max_connections", 25_i64)?
            .set_default("database.min_connections", 2_i64)?
            .set_default("database.acquire_timeout_secs", 5_i64)?
            .set_default("database.run_migrations", true)?
            .set_default("auth.cookie_name", "auth_token")?
            .set_default("feed.top_communities", 3_i64)?
            .set_default("feed.default_limit", 10_i64)?
            .set_default("feed.max_limit", 100_i64)?
            .set_default("feed.query_timeout_ms", 5000_i64)?
            .set_default("feed.min_age_minutes", 1.0)?
            .set_default("feed.like_weight", 0.3)?
            .set_default("feed.comment_weight", 0.5)?
            .set_default("feed.bookmark_weight", 0.2)?
            .set_default("log.filter", "info")?
            .set_default("log.format", "pretty")?)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        let feed = &self.feed;

        if feed.top_communities < 1 {
            return invalid("feed.top_communities must be >= 1");
        }
        if feed.default_limit < 1 {
            return invalid("feed.default_limit must be >= 1");
        }
        if feed.max_limit < feed.default_limit {
            return invalid("feed.max_limit must be >= feed.default_limit");
        }
        if feed.query_timeout_ms == 0 {
            return invalid("feed.query_timeout_ms must be > 0");
        }
        if !(feed.min_age_minutes.is_finite() && feed.min_age_minutes > 0.0) {
            return invalid("feed.min_age_minutes must be a positive number");
        }
        for (name, weight) in [
            ("feed.like_weight", feed.like_weight),
            ("feed.comment_weight", feed.comment_weight),
            ("feed.bookmark_weight", feed.bookmark_weight),
        ] {
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(ConfigError::Invalid(format!("{name} must be >= 0")));
            }
        }
        if self.auth.jwt_secret.expose_secret().len() < 32 {
            return invalid("auth.jwt_secret must be at least 32 bytes");
        }
        if self.database.backend == StorageBackend::Postgres && self.database.url.is_none() {
            return invalid("database.url is required for the postgres backend");
        }
        if self.database.backend == StorageBackend::Memory && self.is_production() {
            return invalid("database.backend = \"memory\" is not allowed in production");
        }
        if self.database.max_connections < self.database.min_connections {
            return invalid("database.max_connections must be >= database.min_connections");
        }
        Ok(())
    }
}
