use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;

use crate::okr::error::{OkrError, OkrResult};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub fn create_pool(database_url: &str, max_connections: u32) -> OkrResult<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Ok(Pool::builder()
        .max_size(max_connections.max(1))
        .build(manager)?)
}

/// Applies pending migrations and returns how many ran.
pub fn run_migrations(pool: &DbPool) -> OkrResult<usize> {
    let mut conn = pool.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| OkrError::Storage(format!("Migration error: {e}")))?;
    for version in &applied {
        info!("Applied migration {version}");
    }
    Ok(applied.len())
}
