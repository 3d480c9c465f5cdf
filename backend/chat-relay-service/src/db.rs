use crate::config::Config;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn init_pool(cfg: &Config) -> Result<Pool<Postgres>, crate::error::AppError> {
    tracing::info!(
        max_connections = cfg.database_max_connections,
        "connecting to postgres"
    );
    let pool = PgPoolOptions::new()
        .max_connections(cfg.database_max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&cfg.database_url)
        .await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}
