//! Handlers for authenticated inbound frames.
//!
//! Every handler checks chat membership before touching storage. Failures are
//! turned into at most one error frame for the sender; nothing propagates
//! back into the session loop.

use crate::error::AppError;
use crate::middleware::ChatMember;
use crate::models::{Message, MessageKind, NewMessage};
use crate::state::AppState;
use crate::websocket::broadcast::{deliver, fan_out, refresh_chat_list_for_participants};
use crate::websocket::message_types::{
    ErrorCode, MessageEvent, ReadReceiptEvent, ReadReceiptPayload, SendMessagePayload,
    ServerFrame, TypingEvent, TypingPayload, MSG_NO_ACCESS, MSG_SEND_FAILED,
};
use crate::websocket::session::SessionUser;
use crate::websocket::ConnectionHandle;
use chrono::Utc;
use tracing::{debug, error, warn};

/// Text stored as the chat's last-message preview
pub fn preview_text(kind: MessageKind, content: &str) -> String {
    if kind == MessageKind::Text || !content.trim().is_empty() {
        content.to_string()
    } else {
        format!("[{}]", kind.to_db())
    }
}

fn message_event(message: &Message, sender_name: &str) -> ServerFrame {
    ServerFrame::Message(MessageEvent {
        id: message.id,
        sender: message.sender_id,
        name: sender_name.to_string(),
        content: message.content.clone(),
        timestamp: message.created_at,
        kind: message.kind,
        chat_id: message.chat_id,
        status: "sent".to_string(),
        reply_to: message.reply_to,
        attachment: message.attachment.clone(),
    })
}

/// Persist a message, then fan it out and refresh every member's chat list.
pub async fn send_message(
    state: &AppState,
    sender: &SessionUser,
    reply: &ConnectionHandle,
    payload: SendMessagePayload,
) {
    let chat_id = payload.chat_id;

    match ChatMember::verify(state.store.as_ref(), sender.id, chat_id).await {
        Ok(_) => {}
        Err(AppError::Forbidden) => {
            debug!(user_id = sender.id, chat_id, "send rejected: not a member");
            deliver(reply, &ServerFrame::error(MSG_NO_ACCESS, ErrorCode::Forbidden));
            return;
        }
        Err(e) => {
            error!(user_id = sender.id, chat_id, error = %e, "membership check failed");
            deliver(reply, &ServerFrame::error(MSG_SEND_FAILED, ErrorCode::SendFailed));
            return;
        }
    }

    let preview = preview_text(payload.kind, &payload.content);
    let new_message = NewMessage {
        chat_id,
        sender_id: sender.id,
        content: payload.content,
        kind: payload.kind,
        reply_to: payload.reply_to,
        attachment: payload.attachment,
    };

    // Persist fully before any recipient can see the event
    let persisted = async {
        let message = state.store.insert_message(new_message).await?;
        state
            .store
            .update_chat_last_message(chat_id, &preview, message.created_at)
            .await?;
        Ok::<_, AppError>(message)
    }
    .await;

    let message = match persisted {
        Ok(message) => message,
        Err(e) => {
            error!(user_id = sender.id, chat_id, error = %e, "failed to persist message");
            deliver(reply, &ServerFrame::error(MSG_SEND_FAILED, ErrorCode::SendFailed));
            return;
        }
    };

    debug!(user_id = sender.id, chat_id, message_id = message.id, "message persisted");

    let event = message_event(&message, &sender.name);
    if let Err(e) = fan_out(state, chat_id, &event, Some(sender.id)).await {
        warn!(chat_id, message_id = message.id, error = %e, "message fan-out failed");
    }
    if let Err(e) = refresh_chat_list_for_participants(state, chat_id).await {
        warn!(chat_id, error = %e, "chat list refresh failed");
    }
}

/// Relay a typing indicator. Silent when the sender is not a member.
pub async fn typing(state: &AppState, sender: &SessionUser, payload: TypingPayload) {
    let chat_id = payload.chat_id;
    match state.store.is_member(chat_id, sender.id).await {
        Ok(true) => {}
        Ok(false) => return,
        Err(e) => {
            warn!(user_id = sender.id, chat_id, error = %e, "typing membership check failed");
            return;
        }
    }

    let event = ServerFrame::Typing(TypingEvent {
        chat_id,
        user_id: sender.id,
        user_name: sender.name.clone(),
        is_typing: payload.is_typing,
    });
    if let Err(e) = fan_out(state, chat_id, &event, Some(sender.id)).await {
        warn!(chat_id, error = %e, "typing fan-out failed");
    }
}

/// Record a read receipt and relay it. Failures are logged only.
pub async fn read_receipt(state: &AppState, reader: &SessionUser, payload: ReadReceiptPayload) {
    let ReadReceiptPayload {
        message_id,
        chat_id,
    } = payload;

    match state.store.is_member(chat_id, reader.id).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(user_id = reader.id, chat_id, "read receipt dropped: not a member");
            return;
        }
        Err(e) => {
            warn!(user_id = reader.id, chat_id, error = %e, "read receipt membership check failed");
            return;
        }
    }

    match state
        .store
        .upsert_read_receipt(chat_id, message_id, reader.id, Utc::now())
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => {
            debug!(user_id = reader.id, chat_id, message_id, "read receipt dropped: message not in chat");
            return;
        }
        Err(e) => {
            warn!(user_id = reader.id, message_id, error = %e, "failed to store read receipt");
            return;
        }
    }

    let event = ServerFrame::ReadReceipt(ReadReceiptEvent {
        message_id,
        user_id: reader.id,
        user_name: reader.name.clone(),
        chat_id,
    });
    if let Err(e) = fan_out(state, chat_id, &event, Some(reader.id)).await {
        warn!(chat_id, error = %e, "read receipt fan-out failed");
    }
}
