use std::str::FromStr;

use anyhow::{bail, Context};

use crate::realtime::DEFAULT_OUTBOX_CAPACITY;

const DEV_JWT_SECRET: &str = "dev-secret-change-in-production";

/// Process configuration, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub access_token_ttl: time::Duration,
    pub refresh_token_ttl: time::Duration,
    pub db_max_connections: u32,
    pub outbox_capacity: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenv::dotenv();

        let jwt_secret = match dotenv::var("JWT_SECRET") {
            Ok(secret) => secret,
            Err(_) if cfg!(debug_assertions) => {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_owned()
            }
            Err(_) => bail!("JWT_SECRET must be set"),
        };

        Ok(Self {
            database_url: var_or("DATABASE_URL", "sqlite://huddle.db".to_owned())?,
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:5000".to_owned())?,
            jwt_secret,
            access_token_ttl: time::Duration::minutes(var_or("ACCESS_TOKEN_TTL_MINUTES", 60)?),
            refresh_token_ttl: time::Duration::days(var_or("REFRESH_TOKEN_TTL_DAYS", 30)?),
            db_max_connections: var_or("DB_MAX_CONNECTIONS", 16)?,
            outbox_capacity: var_or("OUTBOX_CAPACITY", DEFAULT_OUTBOX_CAPACITY)?,
        })
    }
}

fn var_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenv::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}
