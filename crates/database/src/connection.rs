use crate::error::DbError;
use dotenvy::dotenv;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::env;
use std::time::Duration;
use tracing::info;

/// Establishes a connection pool to the PostgreSQL database.
///
/// `DATABASE_URL` is taken from the environment, after loading a `.env` file
/// if one exists.
pub async fn connect() -> Result<PgPool, DbError> {
    // A missing .env is fine as long as the variable is set some other way.
    dotenv().ok();

    let database_url = env::var("DATABASE_URL")
        .map_err(|_e| DbError::ConnectionConfigError("DATABASE_URL must be set.".to_string()))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Connected to PostgreSQL");
    Ok(pool)
}

/// Applies the embedded migrations under `crates/database/migrations`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
