//! Presence repository.

use super::{DbError, PresencePatch, from_millis, to_millis};
use parley_proto::{ConnectionId, UserPresence};
use sqlx::SqlitePool;

/// Repository for presence records.
pub struct PresenceRepository<'a> {
    pool: &'a SqlitePool,
    writer: &'a SqlitePool,
}

impl<'a> PresenceRepository<'a> {
    /// Create a new presence repository.
    pub fn new(pool: &'a SqlitePool, writer: &'a SqlitePool) -> Self {
        Self { pool, writer }
    }

    /// Insert or overwrite the presence row of `identity`.
    pub async fn upsert(
        &self,
        identity: &str,
        patch: &PresencePatch,
    ) -> Result<UserPresence, DbError> {
        sqlx::query(
            r#"
            INSERT INTO presence (identity, online, last_seen, connection)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(identity) DO UPDATE SET
                online = excluded.online,
                last_seen = excluded.last_seen,
                connection = excluded.connection
            "#,
        )
        .bind(identity)
        .bind(patch.online)
        .bind(to_millis(patch.last_seen))
        .bind(patch.connection.map(|c| c.0 as i64))
        .execute(self.writer)
        .await?;

        Ok(UserPresence {
            identity: identity.to_string(),
            online: patch.online,
            last_seen: from_millis(to_millis(patch.last_seen))?,
            connection: patch.connection,
        })
    }

    /// Find presence by identity.
    pub async fn find(&self, identity: &str) -> Result<Option<UserPresence>, DbError> {
        let row = sqlx::query_as::<_, (bool, i64, Option<i64>)>(
            "SELECT online, last_seen, connection FROM presence WHERE identity = ?",
        )
        .bind(identity)
        .fetch_optional(self.pool)
        .await?;

        row.map(|(online, last_seen, connection)| {
            Ok(UserPresence {
                identity: identity.to_string(),
                online,
                last_seen: from_millis(last_seen)?,
                connection: connection.map(|c| ConnectionId(c as u64)),
            })
        })
        .transpose()
    }
}
