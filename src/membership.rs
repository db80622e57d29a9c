//! Conversation management: creation, per-user flags and group membership.
//!
//! Per-user flags (hidden, muted, blocked) are reported back to the acting
//! identity only. Membership changes are broadcast to the room, and room
//! subscriptions follow them immediately.

use crate::db::{ConversationPatch, NewConversation};
use crate::error::{HandlerError, HandlerResult};
use crate::guard;
use crate::pipeline::Actor;
use crate::state::Matrix;
use parley_proto::{Conversation, ConversationId, ConversationKind, Identity, ServerEvent};
use tracing::info;

/// Open a direct conversation or create a group.
///
/// The caller is always a participant. A direct conversation that already
/// exists between the pair is returned (and un-hidden for the caller)
/// instead of creating a second one.
pub async fn create(
    matrix: &Matrix,
    actor: Actor<'_>,
    kind: ConversationKind,
    participants: Vec<Identity>,
    name: Option<String>,
) -> HandlerResult<Conversation> {
    let mut members: Vec<Identity> = vec![actor.identity.to_string()];
    for identity in participants {
        let identity = identity.trim().to_string();
        if identity.is_empty() {
            return Err(HandlerError::invalid("participant identity is empty"));
        }
        if !members.contains(&identity) {
            members.push(identity);
        }
    }

    let store = matrix.store.as_ref();
    let conversation = match kind {
        ConversationKind::Direct => {
            if members.len() != 2 {
                return Err(HandlerError::invalid(
                    "a direct conversation has exactly two participants",
                ));
            }
            let new = NewConversation {
                kind,
                name: None,
                participants: members,
                admins: Vec::new(),
                created_by: actor.identity.to_string(),
            };
            let (conversation, created) = store.open_direct_conversation(new).await?;
            if !created {
                return reopen_direct(matrix, actor, conversation).await;
            }
            conversation
        }
        ConversationKind::Group => {
            let name = name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .ok_or_else(|| HandlerError::invalid("a group needs a name"))?;
            store
                .create_conversation(NewConversation {
                    kind,
                    name: Some(name),
                    participants: members,
                    admins: vec![actor.identity.to_string()],
                    created_by: actor.identity.to_string(),
                })
                .await?
        }
    };

    for identity in &conversation.participants {
        matrix.join_identity(conversation.id, identity);
    }
    matrix.broadcast(
        conversation.id,
        ServerEvent::ConversationCreated(conversation.clone()),
        None,
    );
    info!(
        conversation = %conversation.id,
        kind = conversation.kind.as_str(),
        participants = conversation.participants.len(),
        "Conversation created"
    );
    Ok(conversation)
}

async fn reopen_direct(
    matrix: &Matrix,
    actor: Actor<'_>,
    existing: Conversation,
) -> HandlerResult<Conversation> {
    let conversation = if existing.hidden_by.contains(actor.identity) {
        matrix
            .store
            .update_conversation(
                existing.id,
                ConversationPatch {
                    hidden: Some((actor.identity.to_string(), false)),
                    ..Default::default()
                },
            )
            .await?
            .ok_or(HandlerError::ConversationNotFound(existing.id))?
    } else {
        existing
    };
    matrix.join_identity(conversation.id, actor.identity);
    Ok(conversation)
}

/// Which per-user flag to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Hidden,
    Muted,
    Blocked,
}

/// Set or clear one of the caller's own flags on a conversation.
pub async fn set_flag(
    matrix: &Matrix,
    actor: Actor<'_>,
    conversation_id: ConversationId,
    flag: Flag,
    on: bool,
) -> HandlerResult<Conversation> {
    let store = matrix.store.as_ref();
    let conversation = guard::participant_of(store, conversation_id, actor.identity).await?;

    let value = Some((actor.identity.to_string(), on));
    let patch = match flag {
        Flag::Hidden => ConversationPatch {
            hidden: value,
            ..Default::default()
        },
        Flag::Muted => ConversationPatch {
            muted: value,
            ..Default::default()
        },
        Flag::Blocked => ConversationPatch {
            blocked: value,
            ..Default::default()
        },
    };
    let updated = store
        .update_conversation(conversation.id, patch)
        .await?
        .ok_or(HandlerError::ConversationNotFound(conversation.id))?;

    matrix
        .connections
        .send_to_identity(actor.identity, ServerEvent::ConversationUpdated(updated.clone()));
    Ok(updated)
}

fn require_group_admin(conversation: &Conversation, identity: &str) -> HandlerResult {
    if conversation.kind != ConversationKind::Group {
        return Err(HandlerError::invalid(
            "direct conversations have fixed participants",
        ));
    }
    if !conversation.is_admin(identity) {
        return Err(HandlerError::NotAdmin);
    }
    Ok(())
}

/// Add members to a group. Admins only.
pub async fn add_participants(
    matrix: &Matrix,
    actor: Actor<'_>,
    conversation_id: ConversationId,
    identities: Vec<Identity>,
) -> HandlerResult<Conversation> {
    let store = matrix.store.as_ref();
    let conversation = guard::participant_of(store, conversation_id, actor.identity).await?;
    require_group_admin(&conversation, actor.identity)?;

    let mut added: Vec<Identity> = Vec::new();
    for identity in identities {
        let identity = identity.trim().to_string();
        if !identity.is_empty() && !conversation.is_participant(&identity) && !added.contains(&identity)
        {
            added.push(identity);
        }
    }
    if added.is_empty() {
        return Err(HandlerError::invalid("no new participants"));
    }

    let updated = store
        .update_conversation(
            conversation.id,
            ConversationPatch {
                add_participants: added.clone(),
                ..Default::default()
            },
        )
        .await?
        .ok_or(HandlerError::ConversationNotFound(conversation.id))?;

    for identity in &added {
        matrix.join_identity(updated.id, identity);
    }
    matrix.broadcast(
        updated.id,
        ServerEvent::ConversationUpdated(updated.clone()),
        None,
    );
    info!(conversation = %updated.id, added = added.len(), "Participants added");
    Ok(updated)
}

/// Remove a member from a group. Admins may remove anyone; anyone may
/// remove themselves.
pub async fn remove_participant(
    matrix: &Matrix,
    actor: Actor<'_>,
    conversation_id: ConversationId,
    identity: &str,
) -> HandlerResult<Conversation> {
    let store = matrix.store.as_ref();
    let conversation = guard::participant_of(store, conversation_id, actor.identity).await?;
    if identity != actor.identity {
        require_group_admin(&conversation, actor.identity)?;
    } else if conversation.kind != ConversationKind::Group {
        return Err(HandlerError::invalid("cannot leave a direct conversation"));
    }
    if !conversation.is_participant(identity) {
        return Err(HandlerError::invalid(format!("{identity} is not a participant")));
    }

    let updated = store
        .update_conversation(
            conversation.id,
            ConversationPatch {
                remove_participant: Some(identity.to_string()),
                ..Default::default()
            },
        )
        .await?
        .ok_or(HandlerError::ConversationNotFound(conversation.id))?;

    matrix.leave_identity(updated.id, identity);
    matrix.connections.send_to_identity(
        identity,
        ServerEvent::ConversationRemoved {
            conversation_id: updated.id,
        },
    );
    if matrix.typing.stop(updated.id, identity) {
        matrix.broadcast(
            updated.id,
            ServerEvent::TypingStop {
                conversation_id: updated.id,
                user_id: identity.to_string(),
            },
            None,
        );
    }
    matrix.broadcast(
        updated.id,
        ServerEvent::ConversationUpdated(updated.clone()),
        None,
    );
    info!(conversation = %updated.id, removed = %identity, by = %actor.identity, "Participant removed");
    Ok(updated)
}
