pub mod errors;
pub mod models;
pub mod pool;
pub mod schema;

use anyhow::Context;
use deadpool_diesel::postgres::{Manager, Pool, Runtime};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

pub use errors::DatabaseError;
pub use pool::WalletdPool;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("../../migrations");

const MAX_POOL_SIZE: usize = 16;

pub fn init_pool(app_name: &str, database_url: &str) -> anyhow::Result<Pool> {
    let manager = Manager::new(database_url, Runtime::Tokio1);
    let pool = Pool::builder(manager)
        .max_size(MAX_POOL_SIZE)
        .build()
        .with_context(|| format!("cannot build database pool for {app_name}"))?;
    Ok(pool)
}

pub async fn run_migrations(pool: &Pool) -> anyhow::Result<()> {
    let conn = pool
        .get()
        .await
        .context("cannot check out connection for migrations")?;

    conn.interact(|conn| {
        conn.run_pending_migrations(MIGRATIONS)
            .map(|applied| applied.len())
            .map_err(|e| anyhow::anyhow!("migration failed: {e}"))
    })
    .await
    .map_err(|e| anyhow::anyhow!("migration interact failed: {e}"))?
    .map(|applied| {
        if applied > 0 {
            tracing::info!(applied, "database migrations applied");
        }
    })
}
