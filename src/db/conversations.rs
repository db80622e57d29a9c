//! Conversation repository.
//!
//! Handles conversation records, the participant table (position, admin,
//! unread counter, mute and hidden flags) and per-conversation blocks.

use super::{ConversationPatch, DbError, NewConversation, from_millis, now_millis, parse_id, to_millis};
use parley_proto::{
    Conversation, ConversationId, ConversationKind, Identity, IdentitySet, LastMessage,
    UnreadCounts,
};
use sqlx::{SqliteConnection, SqlitePool};

type ConversationRow = (
    String,
    String,
    Option<String>,
    String,
    i64,
    Option<String>,
    Option<i64>,
);

/// identity, is_admin, unread_count, muted, hidden
type ParticipantRow = (String, bool, i64, bool, bool);

const FIND_DIRECT: &str = r#"
    SELECT c.id
    FROM conversations c
    JOIN conversation_participants pa ON pa.conversation_id = c.id AND pa.identity = ?
    JOIN conversation_participants pb ON pb.conversation_id = c.id AND pb.identity = ?
    WHERE c.kind = 'direct'
    ORDER BY c.created_at
    LIMIT 1
"#;

/// Repository for conversation operations.
pub struct ConversationRepository<'a> {
    pool: &'a SqlitePool,
    writer: &'a SqlitePool,
}

impl<'a> ConversationRepository<'a> {
    /// Create a new conversation repository.
    pub fn new(pool: &'a SqlitePool, writer: &'a SqlitePool) -> Self {
        Self { pool, writer }
    }

    /// Insert a conversation and its participant rows.
    pub async fn insert(&self, new: &NewConversation) -> Result<Conversation, DbError> {
        let mut tx = self.writer.begin().await?;
        let conversation = insert_rows(&mut *tx, new).await?;
        tx.commit().await?;
        Ok(conversation)
    }

    /// Return the direct conversation between the two participants of
    /// `new`, inserting it first if there is none. The flag is true when a
    /// conversation was inserted.
    pub async fn open_direct(&self, new: &NewConversation) -> Result<(Conversation, bool), DbError> {
        let [a, b] = new.participants.as_slice() else {
            return self.insert(new).await.map(|c| (c, true));
        };

        let mut tx = self.writer.begin().await?;
        let existing: Option<String> = sqlx::query_scalar(FIND_DIRECT)
            .bind(a)
            .bind(b)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(id) = existing {
            tx.rollback().await?;
            let id = parse_id(&id)?;
            return self
                .find(id)
                .await?
                .map(|c| (c, false))
                .ok_or_else(|| DbError::Corrupt(format!("direct conversation vanished: {id}")));
        }

        let conversation = insert_rows(&mut *tx, new).await?;
        tx.commit().await?;
        Ok((conversation, true))
    }

    /// Find conversation by id.
    pub async fn find(&self, id: ConversationId) -> Result<Option<Conversation>, DbError> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, kind, name, created_by, created_at, last_message_id, last_message_at
            FROM conversations
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    /// All conversations listing `identity`, most recently active first.
    pub async fn list_for(&self, identity: &str) -> Result<Vec<Conversation>, DbError> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT c.id, c.kind, c.name, c.created_by, c.created_at, c.last_message_id, c.last_message_at
            FROM conversations c
            JOIN conversation_participants p ON p.conversation_id = c.id
            WHERE p.identity = ?
            ORDER BY COALESCE(c.last_message_at, c.created_at) DESC
            "#,
        )
        .bind(identity)
        .fetch_all(self.pool)
        .await?;

        let mut conversations = Vec::with_capacity(rows.len());
        for row in rows {
            conversations.push(self.hydrate(row).await?);
        }
        Ok(conversations)
    }

    /// Apply a patch inside one transaction.
    pub async fn apply_patch(
        &self,
        id: ConversationId,
        patch: &ConversationPatch,
    ) -> Result<Option<Conversation>, DbError> {
        let key = id.to_string();
        let mut tx = self.writer.begin().await?;

        let kind: Option<String> = sqlx::query_scalar("SELECT kind FROM conversations WHERE id = ?")
            .bind(&key)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(kind) = kind else {
            return Ok(None);
        };

        if let Some(last) = patch.last_message {
            sqlx::query(
                "UPDATE conversations SET last_message_id = ?, last_message_at = ? WHERE id = ?",
            )
            .bind(last.map(|l| l.id.to_string()))
            .bind(last.map(|l| to_millis(l.at)))
            .bind(&key)
            .execute(&mut *tx)
            .await?;
        }

        // Only moves forward: a send that commits late must not replace a
        // newer last message. Same-millisecond ties go to the later insert.
        if let Some(candidate) = patch.advance_last_message {
            sqlx::query(
                r#"
                UPDATE conversations SET last_message_id = ?, last_message_at = ?
                WHERE id = ? AND (
                    last_message_at IS NULL
                    OR last_message_at < ?
                    OR (last_message_at = ?
                        AND COALESCE((SELECT rowid FROM messages WHERE id = conversations.last_message_id), 0)
                            <= (SELECT rowid FROM messages WHERE id = ?))
                )
                "#,
            )
            .bind(candidate.id.to_string())
            .bind(to_millis(candidate.at))
            .bind(&key)
            .bind(to_millis(candidate.at))
            .bind(to_millis(candidate.at))
            .bind(candidate.id.to_string())
            .execute(&mut *tx)
            .await?;
        }

        for identity in &patch.add_participants {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO conversation_participants (conversation_id, identity, position)
                VALUES (?, ?, (SELECT COALESCE(MAX(position), -1) + 1
                               FROM conversation_participants WHERE conversation_id = ?))
                "#,
            )
            .bind(&key)
            .bind(identity)
            .bind(&key)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(identity) = &patch.remove_participant {
            let removed = sqlx::query(
                "DELETE FROM conversation_participants WHERE conversation_id = ? AND identity = ?",
            )
            .bind(&key)
            .bind(identity)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if removed > 0 && kind == ConversationKind::Group.as_str() {
                let admins: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM conversation_participants WHERE conversation_id = ? AND is_admin = 1",
                )
                .bind(&key)
                .fetch_one(&mut *tx)
                .await?;

                if admins == 0 {
                    sqlx::query(
                        r#"
                        UPDATE conversation_participants SET is_admin = 1
                        WHERE conversation_id = ? AND identity = (
                            SELECT identity FROM conversation_participants
                            WHERE conversation_id = ?
                            ORDER BY position
                            LIMIT 1
                        )
                        "#,
                    )
                    .bind(&key)
                    .bind(&key)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        if patch.unhide_all {
            sqlx::query("UPDATE conversation_participants SET hidden = 0 WHERE conversation_id = ?")
                .bind(&key)
                .execute(&mut *tx)
                .await?;
        }

        if let Some((identity, hidden)) = &patch.hidden {
            sqlx::query(
                "UPDATE conversation_participants SET hidden = ? WHERE conversation_id = ? AND identity = ?",
            )
            .bind(*hidden)
            .bind(&key)
            .bind(identity)
            .execute(&mut *tx)
            .await?;
        }

        if let Some((identity, muted)) = &patch.muted {
            sqlx::query(
                "UPDATE conversation_participants SET muted = ? WHERE conversation_id = ? AND identity = ?",
            )
            .bind(*muted)
            .bind(&key)
            .bind(identity)
            .execute(&mut *tx)
            .await?;
        }

        match &patch.blocked {
            Some((identity, true)) => {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO conversation_blocks (conversation_id, identity, blocked_at)
                    VALUES (?, ?, ?)
                    "#,
                )
                .bind(&key)
                .bind(identity)
                .bind(to_millis(now_millis()))
                .execute(&mut *tx)
                .await?;
            }
            Some((identity, false)) => {
                sqlx::query("DELETE FROM conversation_blocks WHERE conversation_id = ? AND identity = ?")
                    .bind(&key)
                    .bind(identity)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {}
        }

        tx.commit().await?;

        self.find(id).await
    }

    /// Increment unread counters, one statement per identity.
    pub async fn increment_unread(
        &self,
        id: ConversationId,
        identities: &[Identity],
    ) -> Result<UnreadCounts, DbError> {
        let key = id.to_string();
        let mut tx = self.writer.begin().await?;

        for identity in identities {
            sqlx::query(
                r#"
                UPDATE conversation_participants
                SET unread_count = unread_count + 1
                WHERE conversation_id = ? AND identity = ?
                "#,
            )
            .bind(&key)
            .bind(identity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.unread_counts(id).await
    }

    /// Current unread counters of a conversation.
    pub async fn unread_counts(&self, id: ConversationId) -> Result<UnreadCounts, DbError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT identity, unread_count FROM conversation_participants WHERE conversation_id = ?",
        )
        .bind(id.to_string())
        .fetch_all(self.pool)
        .await?;

        let mut counts = UnreadCounts::new();
        for (identity, count) in rows {
            counts.set(identity, u32::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }

    async fn hydrate(&self, row: ConversationRow) -> Result<Conversation, DbError> {
        let (id, kind, name, created_by, created_at, last_message_id, last_message_at) = row;

        let participants = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT identity, is_admin, unread_count, muted, hidden
            FROM conversation_participants
            WHERE conversation_id = ?
            ORDER BY position
            "#,
        )
        .bind(&id)
        .fetch_all(self.pool)
        .await?;

        let blocked_by: IdentitySet = sqlx::query_scalar::<_, String>(
            "SELECT identity FROM conversation_blocks WHERE conversation_id = ?",
        )
        .bind(&id)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .collect();

        let last_message = match (last_message_id, last_message_at) {
            (Some(message_id), Some(at)) => Some(LastMessage {
                id: parse_id(&message_id)?,
                at: from_millis(at)?,
            }),
            _ => None,
        };

        let mut conversation = Conversation {
            id: parse_id(&id)?,
            kind: ConversationKind::parse(&kind)
                .ok_or_else(|| DbError::Corrupt(format!("conversation kind: {kind}")))?,
            name,
            participants: Vec::with_capacity(participants.len()),
            admins: IdentitySet::new(),
            created_by,
            created_at: from_millis(created_at)?,
            last_message,
            unread: UnreadCounts::new(),
            muted_by: IdentitySet::new(),
            blocked_by,
            hidden_by: IdentitySet::new(),
        };

        for (identity, is_admin, unread, muted, hidden) in participants {
            if is_admin {
                conversation.admins.insert(identity.clone());
            }
            if muted {
                conversation.muted_by.insert(identity.clone());
            }
            if hidden {
                conversation.hidden_by.insert(identity.clone());
            }
            conversation
                .unread
                .set(identity.clone(), u32::try_from(unread).unwrap_or(0));
            conversation.participants.push(identity);
        }

        Ok(conversation)
    }
}

async fn insert_rows(
    conn: &mut SqliteConnection,
    new: &NewConversation,
) -> Result<Conversation, DbError> {
    let id = ConversationId::new();
    let now = now_millis();

    sqlx::query(
        r#"
        INSERT INTO conversations (id, kind, name, created_by, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(new.kind.as_str())
    .bind(new.name.as_deref())
    .bind(&new.created_by)
    .bind(to_millis(now))
    .execute(&mut *conn)
    .await?;

    for (position, identity) in new.participants.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO conversation_participants (conversation_id, identity, position, is_admin)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(identity)
        .bind(position as i64)
        .bind(new.admins.contains(identity))
        .execute(&mut *conn)
        .await?;
    }

    let mut unread = UnreadCounts::new();
    for identity in &new.participants {
        unread.set(identity.clone(), 0);
    }

    Ok(Conversation {
        id,
        kind: new.kind,
        name: new.name.clone(),
        participants: new.participants.clone(),
        admins: new.admins.iter().cloned().collect(),
        created_by: new.created_by.clone(),
        created_at: now,
        last_message: None,
        unread,
        muted_by: IdentitySet::new(),
        blocked_by: IdentitySet::new(),
        hidden_by: IdentitySet::new(),
    })
}
