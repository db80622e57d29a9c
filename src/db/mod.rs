//! Database module for persistent storage.
//!
//! Provides the [`Store`] abstraction the core is written against, and two
//! backends:
//! - [`Database`]: async SQLite access using SQLx (conversations,
//!   participants, messages, receipts, presence)
//! - [`MemoryStore`]: process-local maps for tests and ephemeral deployments

mod conversations;
mod memory;
mod messages;
mod presence;
mod sqlite;
mod store;

pub use conversations::ConversationRepository;
pub use memory::MemoryStore;
pub use messages::MessageRepository;
pub use presence::PresenceRepository;
pub use store::{
    ConversationPatch, MessagePatch, NewConversation, NewMessage, PresencePatch, ReactionChange,
    Store,
};

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
    #[error("migration error: {0}")]
    Migration(sqlx::migrate::MigrateError),
    #[error("store unavailable")]
    Unavailable,
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Database handle with connection pools.
///
/// Reads go through `pool`. Every write goes through `writer`, a
/// single-connection pool, so write transactions never contend for the
/// SQLite write lock and a transaction that reads before it writes always
/// sees the latest commit.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    writer: SqlitePool,
}

impl Database {
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Sends queue behind each other on the writer.
    const WRITE_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

    const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

    const READ_CONNECTIONS: u32 = 4;

    /// Create a new database connection, running migrations if needed.
    ///
    /// `":memory:"` opens a private shared-cache in-memory database, unique
    /// per call so parallel tests never see each other's rows.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let (pool, writer) = if path == ":memory:" {
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:parley-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true)
                .foreign_keys(true);

            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?;
            (pool.clone(), pool)
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            // WAL lets receipt reads proceed while a send is writing.
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .foreign_keys(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .busy_timeout(Self::BUSY_TIMEOUT);

            let writer = SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::WRITE_ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options.clone())
                .await?;

            let pool = SqlitePoolOptions::new()
                .max_connections(Self::READ_CONNECTIONS)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?;
            (pool, writer)
        };

        info!(path = %path, "Database connected");

        Self::run_migrations(&writer).await?;

        let integrity_result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&pool)
            .await?;

        if integrity_result != "ok" {
            tracing::error!(
                integrity_check = %integrity_result,
                "Database integrity check FAILED - corruption detected!"
            );
            return Err(DbError::Corrupt(format!(
                "integrity check failed: {integrity_result}"
            )));
        }

        info!("Database integrity check passed");

        Ok(Self { pool, writer })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(DbError::Migration)?;

        info!("Database migrations checked/applied");
        Ok(())
    }

    /// Get conversation repository.
    pub fn conversations(&self) -> ConversationRepository<'_> {
        ConversationRepository::new(&self.pool, &self.writer)
    }

    /// Get message repository.
    pub fn messages(&self) -> MessageRepository<'_> {
        MessageRepository::new(&self.pool, &self.writer)
    }

    /// Get presence repository.
    pub fn presence(&self) -> PresenceRepository<'_> {
        PresenceRepository::new(&self.pool, &self.writer)
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::Sqlx(err)
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err)
    }
}

/// Stored timestamps are unix milliseconds.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DbError::Corrupt(format!("timestamp out of range: {ms}")))
}

/// Current time truncated to what the database can hold.
pub(crate) fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

pub(crate) fn parse_id<T: FromStr>(raw: &str) -> Result<T, DbError> {
    raw.parse()
        .map_err(|_| DbError::Corrupt(format!("bad id: {raw}")))
}
