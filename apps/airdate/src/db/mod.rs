//! SQLite access for Airdate: connection setup, embedded migrations, row
//! models and the episode store.

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

pub mod models;
pub mod store;

pub use store::{EpisodeQuery, EpisodeStore, SqliteStore};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("src/db/migrations");
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    Connection(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] refinery::Error),
}

/// Applies pragmas and pending migrations to a freshly opened connection.
fn prepare(mut conn: Connection) -> Result<Connection, DbError> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )?;

    let report = embedded::migrations::runner().run(&mut conn)?;
    for migration in report.applied_migrations() {
        tracing::info!(
            version = migration.version(),
            name = migration.name(),
            "Applied migration"
        );
    }

    Ok(conn)
}

/// Opens the database at `db_path`, creating and migrating it as needed.
pub fn init_db<P: AsRef<Path>>(db_path: P) -> Result<Connection, DbError> {
    prepare(Connection::open(db_path)?)
}

/// In-memory database with the full schema, for tests.
pub fn init_db_memory() -> Result<Connection, DbError> {
    prepare(Connection::open_in_memory()?)
}
