use std::error::Error;

use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::debug;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub fn apply_migrations(
    conn: &mut SqliteConnection,
) -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    if !applied.is_empty() {
        debug!(count = applied.len(), "applied database migrations");
    }
    Ok(())
}
