// src/utils/db_connect.rs
use anyhow::{Context, Result};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use log::info;
use std::time::Duration;
use tokio_postgres::{Config, NoTls};

pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

// One row per agent, so a handful of connections is plenty.
const SNAPSHOT_POOL_SIZE: u32 = 4;

/// Connection settings for the snapshot database, from `POSTGRES_*` variables.
#[derive(Clone, PartialEq, Eq)]
pub struct PgSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    password: String,
}

impl PgSettings {
    pub fn from_env() -> Self {
        let var = |name: &str, default: &str| std::env::var(name).unwrap_or_else(|_| default.to_string());
        Self {
            host: var("POSTGRES_HOST", "127.0.0.1"),
            port: var("POSTGRES_PORT", "5432").parse().unwrap_or(5432),
            dbname: var("POSTGRES_DB", "postapply"),
            user: var("POSTGRES_USER", "postgres"),
            password: var("POSTGRES_PASSWORD", ""),
        }
    }

    fn to_config(&self) -> Config {
        let mut config = Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user)
            .password(&self.password)
            .application_name("postapply_rl")
            .connect_timeout(Duration::from_secs(10));
        config
    }
}

/// Opens the pool and checks it with a round trip before handing it out.
pub async fn connect() -> Result<PgPool> {
    let settings = PgSettings::from_env();
    info!(
        "Connecting to snapshot database {}@{}:{}/{}",
        settings.user, settings.host, settings.port, settings.dbname
    );
    let manager = PostgresConnectionManager::new(settings.to_config(), NoTls);

    let pool = Pool::builder()
        .max_size(SNAPSHOT_POOL_SIZE)
        .connection_timeout(Duration::from_secs(15))
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;

    {
        let conn = pool
            .get()
            .await
            .context("Failed to get test connection from pool")?;
        conn.query_one("SELECT 1", &[])
            .await
            .context("Test query 'SELECT 1' failed")?;
    }
    info!("Snapshot database pool ready (max {} connections)", SNAPSHOT_POOL_SIZE);
    Ok(pool)
}
