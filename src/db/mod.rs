mod channels;
mod direct;
mod messages;
mod models;
mod users;

use std::str::FromStr;

use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, SqlitePool};

use crate::include_res;

pub use models::*;
pub use channels::NewChannel;
pub use messages::Destination;
pub use users::NewUser;

/// Durable storage for users, channels, direct chats, messages, reactions and
/// notifications.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // every pooled connection to `:memory:` is its own database
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };

        let store = Self {
            pool: pool_options.connect_with(options).await?,
        };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(include_res!(str, "/schema.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
