use super::Actor;
use crate::db::{MessagePatch, ReactionChange};
use crate::error::{HandlerError, HandlerResult};
use crate::guard;
use crate::state::Matrix;
use parley_proto::{Message, MessageId, Reaction, ServerEvent};

/// Reaction kind that clears the caller's reaction instead of setting one.
pub const REMOVE_KIND: &str = "remove";

/// Set, replace or clear the caller's reaction to a message.
pub async fn react(
    matrix: &Matrix,
    actor: Actor<'_>,
    message_id: MessageId,
    kind: String,
    glyph: Option<String>,
) -> HandlerResult<Message> {
    let store = matrix.store.as_ref();
    let (message, _) = guard::message_in_reach(store, message_id, actor.identity).await?;
    if message.is_deleted() {
        return Err(HandlerError::invalid("cannot react to a deleted message"));
    }
    let kind = kind.trim().to_string();
    if kind.is_empty() {
        return Err(HandlerError::invalid("reaction kind is empty"));
    }

    let identity = actor.identity.to_string();
    let (change, glyph) = if kind == REMOVE_KIND {
        (ReactionChange::Remove { identity }, None)
    } else {
        let reaction = Reaction {
            kind: kind.clone(),
            glyph: glyph.clone(),
        };
        (ReactionChange::Set { identity, reaction }, glyph)
    };

    let updated = store
        .update_message(message.id, MessagePatch::reaction(change))
        .await?
        .ok_or(HandlerError::MessageNotFound(message.id))?;

    matrix.broadcast(
        updated.conversation_id,
        ServerEvent::MessageReaction {
            conversation_id: updated.conversation_id,
            message_id: updated.id,
            user_id: actor.identity.to_string(),
            kind,
            glyph,
        },
        None,
    );
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::super::send;
    use super::super::test_support::Harness;
    use super::*;
    use parley_proto::MessageBody;

    #[tokio::test]
    async fn set_replace_and_remove() {
        let h = Harness::new();
        let c1 = h.direct("alice", "bob").await;
        let mut alice = h.connect("alice").await;
        let bob = h.connect("bob").await;
        let message = send(&h.matrix, alice.actor(), c1.id, MessageBody::text("hi"))
            .await
            .unwrap();

        react(&h.matrix, bob.actor(), message.id, "like".into(), Some("+1".into()))
            .await
            .unwrap();
        let updated = react(&h.matrix, bob.actor(), message.id, "love".into(), None)
            .await
            .unwrap();
        assert_eq!(updated.reactions.len(), 1);
        assert_eq!(updated.reactions.get("bob").map(|r| r.kind.as_str()), Some("love"));

        alice.events();
        let updated = react(&h.matrix, bob.actor(), message.id, REMOVE_KIND.into(), Some("x".into()))
            .await
            .unwrap();
        assert!(updated.reactions.get("bob").is_none());
        assert!(matches!(
            alice.events().as_slice(),
            [ServerEvent::MessageReaction { kind, glyph: None, user_id, .. }]
                if kind == "remove" && user_id == "bob"
        ));
    }

    #[tokio::test]
    async fn outsiders_cannot_react() {
        let h = Harness::new();
        let c1 = h.direct("alice", "bob").await;
        let alice = h.connect("alice").await;
        let mallory = h.connect("mallory").await;
        let message = send(&h.matrix, alice.actor(), c1.id, MessageBody::text("hi"))
            .await
            .unwrap();

        assert!(matches!(
            react(&h.matrix, mallory.actor(), message.id, "like".into(), None).await,
            Err(HandlerError::NotParticipant(_))
        ));
        assert!(matches!(
            react(&h.matrix, alice.actor(), message.id, " ".into(), None).await,
            Err(HandlerError::Invalid(_))
        ));
    }
}
