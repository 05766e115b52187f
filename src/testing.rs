//! Test utilities for database setup.
//!
//! Reuses the real schema initialization so tests never carry their own copy.

use tempfile::TempDir;

use crate::db::{self, DbPool, SqliteStore};

/// A migrated database in a temporary directory, removed on drop.
pub struct TestEnv {
  /// Temporary directory (kept alive for database file persistence)
  pub temp: TempDir,
  pub pool: DbPool,
  pub store: SqliteStore,
}

impl TestEnv {
  pub fn new() -> rusqlite::Result<Self> {
    let temp = TempDir::new().map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    let pool = db::init_db(&temp.path().join("geodrops.db"))?;
    let store = SqliteStore::new(pool.clone());
    Ok(Self { temp, pool, store })
  }
}
