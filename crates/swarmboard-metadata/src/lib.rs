//! SQLite run store for SwarmBoard.

mod run_repository;
mod util;

pub use run_repository::SqliteRunRepository;
pub use util::{create_sqlite_pool, run_migrations};

/// Embedded SQL migrations for the run store.
pub const MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
