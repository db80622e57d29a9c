//! Message repository.
//!
//! Messages are never physically removed. Reactions, read receipts and
//! deliveries live in their own tables; receipts are insert-or-ignore so
//! the read and delivered sets only grow.

use super::{
    DbError, MessagePatch, NewMessage, ReactionChange, from_millis, now_millis, parse_id,
    to_millis,
};
use parley_proto::{
    ContentKind, ConversationId, ForwardOrigin, IdentitySet, Message, MessageId, Reaction,
    Reactions,
};
use sqlx::SqlitePool;

type MessageRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<f64>,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
    Option<i64>,
    Option<i64>,
);

const SELECT_MESSAGE: &str = r#"
    SELECT id, conversation_id, sender, text, content_kind, media_url, file_name, file_size,
           duration, reply_to, forwarded_from, original_sender, created_at, edited_at, deleted_at
    FROM messages
"#;

/// Repository for message operations.
pub struct MessageRepository<'a> {
    pool: &'a SqlitePool,
    writer: &'a SqlitePool,
}

impl<'a> MessageRepository<'a> {
    /// Create a new message repository.
    pub fn new(pool: &'a SqlitePool, writer: &'a SqlitePool) -> Self {
        Self { pool, writer }
    }

    /// Insert a message.
    ///
    /// The timestamp is taken once the writer is held, so insertion order
    /// and `created_at` order agree.
    pub async fn insert(&self, new: &NewMessage) -> Result<Message, DbError> {
        let id = MessageId::new();
        let mut conn = self.writer.acquire().await?;
        let now = now_millis();

        sqlx::query(
            r#"
            INSERT INTO messages (
                id, conversation_id, sender, text, content_kind, media_url, file_name,
                file_size, duration, reply_to, forwarded_from, original_sender, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(new.conversation_id.to_string())
        .bind(&new.sender)
        .bind(&new.text)
        .bind(new.content_kind.as_str())
        .bind(new.media_url.as_deref())
        .bind(new.file_name.as_deref())
        .bind(new.file_size.map(|s| s as i64))
        .bind(new.duration)
        .bind(new.reply_to.map(|r| r.to_string()))
        .bind(new.forward.as_ref().map(|f| f.original_message_id.to_string()))
        .bind(new.forward.as_ref().map(|f| f.original_sender.as_str()))
        .bind(to_millis(now))
        .execute(&mut *conn)
        .await?;

        Ok(Message {
            id,
            conversation_id: new.conversation_id,
            sender: new.sender.clone(),
            text: new.text.clone(),
            content_kind: new.content_kind,
            media_url: new.media_url.clone(),
            file_name: new.file_name.clone(),
            file_size: new.file_size,
            duration: new.duration,
            reply_to: new.reply_to,
            forward: new.forward.clone(),
            reactions: Reactions::new(),
            read_by: IdentitySet::new(),
            delivered_to: IdentitySet::new(),
            created_at: now,
            edited_at: None,
            deleted_at: None,
        })
    }

    /// Find message by id.
    pub async fn find(&self, id: MessageId) -> Result<Option<Message>, DbError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!("{SELECT_MESSAGE} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(self.pool)
            .await?;

        match row {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    /// Most recent message of a conversation that is not deleted.
    pub async fn latest_visible(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Message>, DbError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "{SELECT_MESSAGE} WHERE conversation_id = ? AND deleted_at IS NULL \
             ORDER BY created_at DESC, rowid DESC LIMIT 1"
        ))
        .bind(conversation_id.to_string())
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    /// Apply a patch inside one transaction.
    pub async fn apply_patch(
        &self,
        id: MessageId,
        patch: &MessagePatch,
    ) -> Result<Option<Message>, DbError> {
        let key = id.to_string();
        let now = to_millis(now_millis());
        let mut tx = self.writer.begin().await?;

        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM messages WHERE id = ?")
            .bind(&key)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        if let Some(text) = &patch.text {
            sqlx::query("UPDATE messages SET text = ? WHERE id = ?")
                .bind(text)
                .bind(&key)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(edited_at) = patch.edited_at {
            sqlx::query("UPDATE messages SET edited_at = ? WHERE id = ?")
                .bind(to_millis(edited_at))
                .bind(&key)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(deleted_at) = patch.deleted_at {
            sqlx::query("UPDATE messages SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
                .bind(to_millis(deleted_at))
                .bind(&key)
                .execute(&mut *tx)
                .await?;
        }

        match &patch.reaction {
            Some(ReactionChange::Set { identity, reaction }) => {
                sqlx::query(
                    r#"
                    INSERT INTO message_reactions (message_id, identity, kind, glyph, reacted_at)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT(message_id, identity)
                    DO UPDATE SET kind = excluded.kind, glyph = excluded.glyph, reacted_at = excluded.reacted_at
                    "#,
                )
                .bind(&key)
                .bind(identity)
                .bind(&reaction.kind)
                .bind(reaction.glyph.as_deref())
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            Some(ReactionChange::Remove { identity }) => {
                sqlx::query("DELETE FROM message_reactions WHERE message_id = ? AND identity = ?")
                    .bind(&key)
                    .bind(identity)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {}
        }

        for identity in &patch.read_by {
            sqlx::query(
                "INSERT OR IGNORE INTO message_reads (message_id, identity, read_at) VALUES (?, ?, ?)",
            )
            .bind(&key)
            .bind(identity)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        for identity in &patch.delivered_to {
            sqlx::query(
                "INSERT OR IGNORE INTO message_deliveries (message_id, identity, delivered_at) VALUES (?, ?, ?)",
            )
            .bind(&key)
            .bind(identity)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.find(id).await
    }

    /// Mark every unread message not authored by `reader` as read and zero
    /// the reader's unread counter. Returns the newly read ids in order.
    pub async fn mark_conversation_read(
        &self,
        conversation_id: ConversationId,
        reader: &str,
    ) -> Result<Vec<MessageId>, DbError> {
        let key = conversation_id.to_string();
        let now = to_millis(now_millis());
        let mut tx = self.writer.begin().await?;

        let unread: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT m.id FROM messages m
            WHERE m.conversation_id = ? AND m.sender != ?
              AND NOT EXISTS (
                  SELECT 1 FROM message_reads r WHERE r.message_id = m.id AND r.identity = ?
              )
            ORDER BY m.created_at, m.rowid
            "#,
        )
        .bind(&key)
        .bind(reader)
        .bind(reader)
        .fetch_all(&mut *tx)
        .await?;

        for id in &unread {
            sqlx::query(
                "INSERT OR IGNORE INTO message_reads (message_id, identity, read_at) VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(reader)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE conversation_participants SET unread_count = 0 WHERE conversation_id = ? AND identity = ?",
        )
        .bind(&key)
        .bind(reader)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        unread.iter().map(|id| parse_id(id)).collect()
    }

    async fn hydrate(&self, row: MessageRow) -> Result<Message, DbError> {
        let (
            id,
            conversation_id,
            sender,
            text,
            content_kind,
            media_url,
            file_name,
            file_size,
            duration,
            reply_to,
            forwarded_from,
            original_sender,
            created_at,
            edited_at,
            deleted_at,
        ) = row;

        let reaction_rows = sqlx::query_as::<_, (String, String, Option<String>)>(
            "SELECT identity, kind, glyph FROM message_reactions WHERE message_id = ?",
        )
        .bind(&id)
        .fetch_all(self.pool)
        .await?;
        let mut reactions = Reactions::new();
        for (identity, kind, glyph) in reaction_rows {
            reactions.set(identity, Reaction { kind, glyph });
        }

        let read_by: IdentitySet =
            sqlx::query_scalar::<_, String>("SELECT identity FROM message_reads WHERE message_id = ?")
                .bind(&id)
                .fetch_all(self.pool)
                .await?
                .into_iter()
                .collect();

        let delivered_to: IdentitySet = sqlx::query_scalar::<_, String>(
            "SELECT identity FROM message_deliveries WHERE message_id = ?",
        )
        .bind(&id)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .collect();

        let forward = match (forwarded_from, original_sender) {
            (Some(source), Some(original_sender)) => Some(ForwardOrigin {
                original_message_id: parse_id(&source)?,
                original_sender,
            }),
            _ => None,
        };

        Ok(Message {
            id: parse_id(&id)?,
            conversation_id: parse_id(&conversation_id)?,
            sender,
            text,
            content_kind: ContentKind::parse(&content_kind)
                .ok_or_else(|| DbError::Corrupt(format!("content kind: {content_kind}")))?,
            media_url,
            file_name,
            file_size: file_size.and_then(|s| u64::try_from(s).ok()),
            duration,
            reply_to: reply_to.as_deref().map(parse_id).transpose()?,
            forward,
            reactions,
            read_by,
            delivered_to,
            created_at: from_millis(created_at)?,
            edited_at: edited_at.map(from_millis).transpose()?,
            deleted_at: deleted_at.map(from_millis).transpose()?,
        })
    }
}
