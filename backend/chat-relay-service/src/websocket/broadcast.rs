//! Fan-out of events to the live connections of chat members.
//!
//! Delivery is fire-and-forget: members without a registry entry simply miss
//! the event and catch up through persisted state on their next chat list.

use crate::error::AppResult;
use crate::models::{ChatId, UserId};
use crate::state::AppState;
use crate::websocket::message_types::{ChatListPayload, ServerFrame};
use crate::websocket::ConnectionHandle;
use tracing::{debug, error};

/// Queue one frame on one connection. Returns false when nothing was queued.
pub fn deliver(handle: &ConnectionHandle, frame: &ServerFrame) -> bool {
    let text = match frame.encode() {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "failed to encode server frame");
            return false;
        }
    };

    if handle.send(text) {
        true
    } else {
        debug!(connection_id = %handle.id, "dropping frame for closed connection");
        false
    }
}

/// Deliver `frame` to every online member of `chat_id` except `exclude`.
///
/// Returns the number of connections the frame was queued on. The member list
/// and the registry lookups are not atomic together; a member that drops in
/// between just misses the event.
pub async fn fan_out(
    state: &AppState,
    chat_id: ChatId,
    frame: &ServerFrame,
    exclude: Option<UserId>,
) -> AppResult<usize> {
    let members = state.store.chat_members(chat_id).await?;
    let mut delivered = 0;

    for member in members {
        if Some(member) == exclude {
            continue;
        }
        if let Some(handle) = state.registry.get(member).await {
            if deliver(&handle, frame) {
                delivered += 1;
            }
        }
    }

    debug!(chat_id, delivered, "fan-out complete");
    Ok(delivered)
}

/// Send `user_id` their current chat list on `handle` only
pub async fn push_chat_list(
    state: &AppState,
    user_id: UserId,
    handle: &ConnectionHandle,
) -> AppResult<()> {
    let chats = state.store.list_chats_for_user(user_id).await?;
    deliver(handle, &ServerFrame::ChatList(ChatListPayload { chats }));
    Ok(())
}

/// Push a fresh chat list to every online member of `chat_id`
pub async fn refresh_chat_list_for_participants(state: &AppState, chat_id: ChatId) -> AppResult<()> {
    let members = state.store.chat_members(chat_id).await?;

    for member in members {
        let Some(handle) = state.registry.get(member).await else {
            continue;
        };
        // One member's failed query must not stop the others
        if let Err(e) = push_chat_list(state, member, &handle).await {
            tracing::warn!(chat_id, user_id = member, error = %e, "chat list refresh failed");
        }
    }

    Ok(())
}

/// Push a fresh chat list to `user_id` if they are online
pub async fn refresh_chat_list_for_user(state: &AppState, user_id: UserId) -> AppResult<()> {
    if let Some(handle) = state.registry.get(user_id).await {
        push_chat_list(state, user_id, &handle).await?;
    }
    Ok(())
}
