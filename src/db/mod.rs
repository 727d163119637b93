//! Database initialization and migration runner.
//!
//! SYSTEM CONTEXT
//! ==============
//! The CLI uses this module to open the shared SQLx pool and bring the
//! `canvas_objects` schema up to date before `PgObjectStore` touches it.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

fn db_max_connections() -> u32 {
    match std::env::var("SCENESYNC_DB_MAX_CONNECTIONS").map(|v| v.trim().parse::<u32>()) {
        Ok(Ok(n)) if n > 0 => n,
        _ => DEFAULT_DB_MAX_CONNECTIONS,
    }
}

/// Initialize the `PostgreSQL` connection pool and run migrations.
///
/// # Errors
///
/// Returns an error if the connection or migrations fail.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(db_max_connections())
        .connect(database_url)
        .await?;

    sqlx::migrate!("src/db/migrations").run(&pool).await?;

    Ok(pool)
}
