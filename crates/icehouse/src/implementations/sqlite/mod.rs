//! SQLite-backed catalog store. The database is the single source of truth
//! for the `(namespace, table) -> metadata_location` mapping; all mutual
//! exclusion runs through its transactions and unique constraints.

pub(crate) mod dbutils;
pub mod namespace;
pub mod table;

use std::{str::FromStr, time::Duration};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use self::dbutils::DBErrorHandler;
use crate::catalog::rest::ErrorModel;

pub use namespace::NamespaceRow;
pub use table::TableRow;

const MIGRATIONS: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS namespaces (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        levels     TEXT NOT NULL UNIQUE,
        properties TEXT NOT NULL DEFAULT '{}'
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS tables (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        namespace_id      INTEGER NOT NULL REFERENCES namespaces (id),
        name              TEXT NOT NULL,
        metadata_location TEXT NOT NULL UNIQUE,
        properties        TEXT,
        UNIQUE (namespace_id, name)
    )
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_tables_namespace_id ON tables (namespace_id)
    ",
];

#[derive(Clone, Debug)]
pub struct CatalogState {
    pool: SqlitePool,
}

impl CatalogState {
    /// Connects to the catalog database named by a `sqlite:` DSN, creating
    /// the database file if needed.
    pub async fn connect(database_url: &str) -> Result<Self, ErrorModel> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| {
                ErrorModel::validation(format!("Invalid catalog database URL `{database_url}`: {e}"))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| e.into_error_model("Failed to connect to the catalog database"))?;
        Ok(CatalogState { pool })
    }

    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        CatalogState { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies the embedded schema; idempotent.
    pub async fn migrate(&self) -> Result<(), ErrorModel> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| e.into_error_model("Failed to migrate the catalog database"))?;
        }
        Ok(())
    }
}
