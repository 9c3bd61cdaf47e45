//! Database connection management.

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use diesel::{sql_query, Connection, ConnectionError, RunQueryDsl, SqliteConnection};
use tracing::debug;

use crate::{
    error::{DbError, Result},
    migration::apply_migrations,
};

/// Database connection wrapper with migration support.
pub struct DbConnection {
    conn: SqliteConnection,
}

impl DbConnection {
    /// Opens (creating if needed) the store at `path` and runs pending migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConnectionError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConnectionError::BadConnection(e.to_string()))?;
        }
        Self::establish(&path.to_string_lossy())
    }

    /// A private in-memory store, migrated. Used by tests and dry runs.
    pub fn open_in_memory() -> std::result::Result<Self, ConnectionError> {
        Self::establish(":memory:")
    }

    fn establish(url: &str) -> std::result::Result<Self, ConnectionError> {
        let mut conn = SqliteConnection::establish(url)?;

        for pragma in [
            "PRAGMA journal_mode = WAL;",
            "PRAGMA busy_timeout = 5000;",
            "PRAGMA foreign_keys = ON;",
        ] {
            sql_query(pragma)
                .execute(&mut conn)
                .map_err(|e| ConnectionError::BadConnection(e.to_string()))?;
        }

        apply_migrations(&mut conn).map_err(|e| ConnectionError::BadConnection(e.to_string()))?;
        debug!(url, "database ready");

        Ok(Self { conn })
    }

    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}

impl std::ops::Deref for DbConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl std::ops::DerefMut for DbConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

/// Thread-safe handle to the store, cheap to clone.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<DbConnection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = DbConnection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = DbConnection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn conn(&self) -> Result<MutexGuard<'_, DbConnection>> {
        self.conn.lock().map_err(|_| DbError::PoisonError)
    }

    /// Executes a function with the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> diesel::QueryResult<T>,
    {
        let mut conn = self.conn()?;
        Ok(f(conn.conn())?)
    }

    /// Executes a function within a transaction.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> diesel::QueryResult<T>,
    {
        let mut conn = self.conn()?;
        Ok(conn.conn().transaction(f)?)
    }
}

#[cfg(test)]
mod tests {
    use diesel::prelude::*;
    use tempfile::TempDir;

    use super::*;
    use crate::schema::registries;

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("pkgsync.db");

        let db = Database::open(&path).unwrap();
        assert!(path.exists());

        let count: i64 = db
            .with_conn(|conn| registries::table.count().get_result(conn))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_reopen_keeps_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pkgsync.db");

        drop(Database::open(&path).unwrap());
        let db = Database::open(&path).unwrap();
        assert!(db
            .with_conn(|conn| registries::table.count().get_result::<i64>(conn))
            .is_ok());
    }
}
