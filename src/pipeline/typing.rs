use super::Actor;
use crate::error::HandlerResult;
use crate::guard;
use crate::state::Matrix;
use parley_proto::{ConversationId, ServerEvent};
use std::time::Instant;

/// Update the caller's typing indicator.
///
/// Nothing is persisted. Only transitions are broadcast, and never back to
/// the acting handle; a repeated start just refreshes the expiry.
pub async fn typing(
    matrix: &Matrix,
    actor: Actor<'_>,
    conversation_id: ConversationId,
    is_typing: bool,
) -> HandlerResult<bool> {
    let conversation =
        guard::participant_of(matrix.store.as_ref(), conversation_id, actor.identity).await?;
    let user_id = actor.identity.to_string();

    let (changed, event) = if is_typing {
        (
            matrix
                .typing
                .start(conversation.id, actor.identity, Instant::now()),
            ServerEvent::TypingStart {
                conversation_id: conversation.id,
                user_id,
            },
        )
    } else {
        (
            matrix.typing.stop(conversation.id, actor.identity),
            ServerEvent::TypingStop {
                conversation_id: conversation.id,
                user_id,
            },
        )
    };

    if changed {
        matrix.broadcast(conversation.id, event, Some(actor.conn));
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::*;
    use crate::error::HandlerError;

    #[tokio::test]
    async fn start_and_stop_reach_others_once() {
        let h = Harness::new();
        let c1 = h.direct("alice", "bob").await;
        let mut alice = h.connect("alice").await;
        let mut bob = h.connect("bob").await;
        alice.events();

        assert!(typing(&h.matrix, alice.actor(), c1.id, true).await.unwrap());
        assert!(!typing(&h.matrix, alice.actor(), c1.id, true).await.unwrap());
        assert_eq!(bob.names(), vec!["typing_start"]);
        assert!(alice.events().is_empty());

        assert!(typing(&h.matrix, alice.actor(), c1.id, false).await.unwrap());
        assert_eq!(bob.names(), vec!["typing_stop"]);
    }

    #[tokio::test]
    async fn outsiders_cannot_type() {
        let h = Harness::new();
        let c1 = h.direct("alice", "bob").await;
        let mallory = h.connect("mallory").await;
        assert!(matches!(
            typing(&h.matrix, mallory.actor(), c1.id, true).await,
            Err(HandlerError::NotParticipant(_))
        ));
        assert!(h.matrix.typing.typing_in(c1.id).is_empty());
    }
}
