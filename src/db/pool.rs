//! SQLite connection pool for the mirror store.
//!
//! WAL mode lets the orchestrator persist progress ticks and the resolver
//! read reference tables while a per-parent ingestion transaction is open.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Type alias for the SQLite connection pool.
pub type DbPool = Pool<Sqlite>;

/// Upper bound on pooled connections. One writer at a time is all SQLite
/// allows; the rest serve readers.
const MAX_CONNECTIONS: u32 = 5;

/// Build connect options for the mirror database at `db_path`.
fn connect_options(db_path: &Path) -> Result<SqliteConnectOptions, sqlx::Error> {
    let db_url = format!("sqlite:{}", db_path.display());

    Ok(SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        // Child ingestion holds a write transaction across page fetches
        .busy_timeout(Duration::from_secs(60))
        .pragma("wal_autocheckpoint", "1000"))
}

/// Create a new connection pool with WAL mode enabled.
///
/// The parent directory of `db_path` must already exist.
pub async fn create_pool(db_path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(connect_options(db_path)?)
        .await?;

    let mode: (String,) = sqlx::query_as("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await?;

    if !mode.0.eq_ignore_ascii_case("wal") {
        log::warn!("SQLite journal mode is {}, expected wal", mode.0);
    }

    Ok(pool)
}
