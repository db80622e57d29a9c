use super::{Actor, publish};
use crate::db::NewMessage;
use crate::error::{HandlerError, HandlerResult};
use crate::guard;
use crate::state::Matrix;
use parley_proto::{ConversationId, ForwardOrigin, Message, MessageId};

/// Copy a message into another conversation.
///
/// The caller must belong to both conversations. The copy never carries a
/// reply reference. Forwarding a forward keeps the first author.
pub async fn forward(
    matrix: &Matrix,
    actor: Actor<'_>,
    message_id: MessageId,
    target_id: ConversationId,
) -> HandlerResult<Message> {
    let store = matrix.store.as_ref();
    let (source, _) = guard::message_in_reach(store, message_id, actor.identity).await?;
    let target = guard::participant_of(store, target_id, actor.identity).await?;
    guard::require_not_blocked(&target, actor.identity)?;
    if source.is_deleted() {
        return Err(HandlerError::invalid("cannot forward a deleted message"));
    }

    let original_sender = match &source.forward {
        Some(origin) => origin.original_sender.clone(),
        None => source.sender.clone(),
    };

    publish(
        matrix,
        &target,
        NewMessage {
            conversation_id: target.id,
            sender: actor.identity.to_string(),
            text: source.text,
            content_kind: source.content_kind,
            media_url: source.media_url,
            file_name: source.file_name,
            file_size: source.file_size,
            duration: source.duration,
            reply_to: None,
            forward: Some(ForwardOrigin {
                original_message_id: source.id,
                original_sender,
            }),
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::super::send;
    use super::super::test_support::Harness;
    use super::*;
    use crate::db::Store;
    use parley_proto::MessageBody;

    #[tokio::test]
    async fn forward_requires_membership_of_target() {
        let h = Harness::new();
        let source_conv = h.direct("alice", "bob").await;
        let target = h.direct("carol", "dave").await;
        let alice = h.connect("alice").await;
        let bob = h.connect("bob").await;
        let message = send(&h.matrix, alice.actor(), source_conv.id, MessageBody::text("hi"))
            .await
            .unwrap();

        let err = forward(&h.matrix, bob.actor(), message.id, target.id)
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::NotParticipant(id) if id == target.id));
        assert!(h.store.latest_message(target.id).await.unwrap().is_none());
        assert!(h.conversation(&target).await.last_message.is_none());
    }

    #[tokio::test]
    async fn forward_tags_origin_and_drops_reply() {
        let h = Harness::new();
        let c1 = h.direct("alice", "bob").await;
        let c2 = h.direct("bob", "carol").await;
        let c3 = h.direct("carol", "dave").await;
        let alice = h.connect("alice").await;
        let bob = h.connect("bob").await;
        let carol = h.connect("carol").await;

        let first = send(&h.matrix, alice.actor(), c1.id, MessageBody::text("root"))
            .await
            .unwrap();
        let body = MessageBody {
            reply_to: Some(first.id),
            ..MessageBody::text("news")
        };
        let original = send(&h.matrix, alice.actor(), c1.id, body).await.unwrap();

        let hop1 = forward(&h.matrix, bob.actor(), original.id, c2.id)
            .await
            .unwrap();
        assert_eq!(hop1.conversation_id, c2.id);
        assert_eq!(hop1.sender, "bob");
        assert_eq!(hop1.text, "news");
        assert_eq!(hop1.reply_to, None);
        assert_eq!(
            hop1.forward,
            Some(ForwardOrigin {
                original_message_id: original.id,
                original_sender: "alice".into(),
            })
        );
        assert_eq!(h.conversation(&c2).await.unread.get("carol"), 1);

        let hop2 = forward(&h.matrix, carol.actor(), hop1.id, c3.id).await.unwrap();
        let origin = hop2.forward.unwrap();
        assert_eq!(origin.original_message_id, hop1.id);
        assert_eq!(origin.original_sender, "alice");
    }
}
