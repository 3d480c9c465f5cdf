//! Wire format of the chat relay.
//!
//! Every frame is a UTF-8 JSON object `{ "type": ..., "payload": ... }`.

use crate::models::{
    flexible_id, flexible_id_opt, ChatId, ChatListEntry, MessageId, MessageKind, PublicUser,
    UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MSG_TOKEN_REQUIRED: &str = "authentication token required";
pub const MSG_INVALID_TOKEN: &str = "invalid token";
pub const MSG_NOT_AUTHENTICATED: &str = "client not authenticated";
pub const MSG_NO_ACCESS: &str = "no access to this chat";
pub const MSG_INVALID_FORMAT: &str = "invalid message format";
pub const MSG_SEND_FAILED: &str = "failed to send message";
pub const MSG_BINARY_UNSUPPORTED: &str = "binary frames are not supported";

// ============================================================
// Inbound
// ============================================================

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    #[serde(deserialize_with = "flexible_id")]
    pub chat_id: ChatId,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "type")]
    pub kind: MessageKind,
    #[serde(default, deserialize_with = "flexible_id_opt")]
    pub reply_to: Option<MessageId>,
    #[serde(default)]
    pub attachment: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    #[serde(deserialize_with = "flexible_id")]
    pub chat_id: ChatId,
    #[serde(default)]
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptPayload {
    #[serde(deserialize_with = "flexible_id")]
    pub message_id: MessageId,
    #[serde(deserialize_with = "flexible_id")]
    pub chat_id: ChatId,
}

/// Frames a client may send
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    SendMessage(SendMessagePayload),
    Typing(TypingPayload),
    ReadReceipt(ReadReceiptPayload),
    ChatList,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

impl FrameError {
    /// The error frame sent back to the client
    pub fn to_frame(&self) -> ServerFrame {
        match self {
            FrameError::InvalidFormat(_) => {
                ServerFrame::error(MSG_INVALID_FORMAT, ErrorCode::InvalidFormat)
            }
            FrameError::UnknownType(_) => ServerFrame::error(self.to_string(), ErrorCode::UnknownType),
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, FrameError> {
    serde_json::from_value(value).map_err(|e| FrameError::InvalidFormat(e.to_string()))
}

impl ClientFrame {
    /// Parse a text frame.
    ///
    /// The envelope is checked first, so an unknown `type` is reported as such
    /// even when its payload would not parse.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let raw: RawFrame =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidFormat(e.to_string()))?;

        match raw.kind.as_str() {
            "message" => {
                let p: SendMessagePayload = payload(raw.payload)?;
                if p.kind == MessageKind::Text && p.content.trim().is_empty() {
                    return Err(FrameError::InvalidFormat("empty text message".into()));
                }
                Ok(ClientFrame::SendMessage(p))
            }
            "typing" => Ok(ClientFrame::Typing(payload(raw.payload)?)),
            "read_receipt" => Ok(ClientFrame::ReadReceipt(payload(raw.payload)?)),
            "chat_list" => Ok(ClientFrame::ChatList),
            other => Err(FrameError::UnknownType(other.to_string())),
        }
    }
}

// ============================================================
// Outbound
// ============================================================

/// Machine-readable tag carried next to every error message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AuthRequired,
    InvalidToken,
    NotAuthenticated,
    Forbidden,
    InvalidFormat,
    UnknownType,
    SendFailed,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub success: bool,
    pub user: PublicUser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatListPayload {
    pub chats: Vec<ChatListEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub id: MessageId,
    pub sender: UserId,
    pub name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub chat_id: ChatId,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub user_name: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptEvent {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub user_name: String,
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusEvent {
    pub user_id: UserId,
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    pub code: ErrorCode,
}

/// Frames the server sends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerFrame {
    Auth(AuthPayload),
    ChatList(ChatListPayload),
    Message(MessageEvent),
    Typing(TypingEvent),
    ReadReceipt(ReadReceiptEvent),
    UserStatus(UserStatusEvent),
    Error(ErrorPayload),
}

impl ServerFrame {
    pub fn error(message: impl Into<String>, code: ErrorCode) -> Self {
        ServerFrame::Error(ErrorPayload {
            message: message.into(),
            code,
        })
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
