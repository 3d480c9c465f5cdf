use crate::error::AppResult;
use crate::models::UserId;
use crate::state::AppState;
use crate::websocket::broadcast::deliver;
use crate::websocket::message_types::{ServerFrame, UserStatusEvent};
use chrono::Utc;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Mark `user_id` online and tell every chat they share with someone.
pub async fn on_connect(state: &AppState, user_id: UserId) -> AppResult<()> {
    if let Err(e) = state.users.set_presence(user_id, true, Utc::now()).await {
        warn!(user_id, error = %e, "failed to store online presence");
    }
    info!(user_id, "user online");

    let frame = ServerFrame::UserStatus(UserStatusEvent {
        user_id,
        is_online: true,
        last_seen: None,
    });
    publish(state, user_id, &frame).await
}

/// Mark `user_id` offline and tell every chat they share with someone.
///
/// The caller removes the registry entry first so the user is not a target of
/// their own offline event.
pub async fn on_disconnect(state: &AppState, user_id: UserId) -> AppResult<()> {
    let now = Utc::now();
    if let Err(e) = state.users.set_presence(user_id, false, now).await {
        warn!(user_id, error = %e, "failed to store offline presence");
    }
    info!(user_id, "user offline");

    let frame = ServerFrame::UserStatus(UserStatusEvent {
        user_id,
        is_online: false,
        last_seen: Some(now),
    });
    publish(state, user_id, &frame).await
}

/// Each counterpart gets the event once, however many chats they share.
async fn publish(state: &AppState, user_id: UserId, frame: &ServerFrame) -> AppResult<()> {
    let chats = state.store.shared_chat_ids(user_id).await?;
    let mut recipients = BTreeSet::new();
    for chat_id in chats {
        match state.store.chat_members(chat_id).await {
            Ok(members) => recipients.extend(members.into_iter().filter(|m| *m != user_id)),
            Err(e) => warn!(user_id, chat_id, error = %e, "presence member lookup failed"),
        }
    }

    for member in recipients {
        if let Some(handle) = state.registry.get(member).await {
            deliver(&handle, frame);
        }
    }
    Ok(())
}
