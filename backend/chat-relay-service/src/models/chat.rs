//! Chat and chat-list data structures

use super::{ChatId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Kind of chat. A `private` chat has exactly two members and is unique per
/// unordered pair of users; a `group` chat has two or more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    #[default]
    Private,
    Group,
}

impl ChatKind {
    /// Parse kind from database string
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "group" => Some(Self::Group),
            _ => None,
        }
    }

    /// Convert kind to database string
    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for ChatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db())
    }
}

/// Member of a chat as shown in the chat list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMemberSummary {
    pub id: UserId,
    pub name: String,
    pub avatar_url: Option<String>,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// One row of a user's chat list.
///
/// Private chats carry the counterpart in `participant`; group chats carry the
/// full roster in `members`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatListEntry {
    pub id: ChatId,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant: Option<ChatMemberSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<ChatMemberSummary>>,
}

impl ChatListEntry {
    /// Attach member information for the viewing user.
    ///
    /// For private chats without an explicit name the counterpart's name is
    /// used as the display name.
    pub fn with_members(mut self, viewer: UserId, roster: Vec<ChatMemberSummary>) -> Self {
        match self.kind {
            ChatKind::Private => {
                let counterpart = roster.into_iter().find(|m| m.id != viewer);
                if self.name.is_none() {
                    self.name = counterpart.as_ref().map(|m| m.name.clone());
                }
                self.participant = counterpart;
                self.members = None;
            }
            ChatKind::Group => {
                self.participant = None;
                self.members = Some(roster);
            }
        }
        self
    }
}

/// Chat list order: most recent message first, chats without messages last,
/// creation time descending as tiebreak.
pub fn chat_list_order(a: &ChatListEntry, b: &ChatListEntry) -> Ordering {
    match (a.last_message_time, b.last_message_time) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| b.created_at.cmp(&a.created_at))
}

pub fn sort_chat_list(entries: &mut [ChatListEntry]) {
    entries.sort_by(chat_list_order);
}
