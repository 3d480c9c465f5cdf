use crate::error::AppResult;
use crate::models::{
    ChatId, ChatKind, ChatListEntry, Message, MessageId, NewMessage, ReadReceipt, User, UserId,
};
use chrono::{DateTime, Utc};

/// Lookup of portal users plus the presence columns the relay owns.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetch a user by id; `None` when the id is unknown
    async fn get_user_by_id(&self, id: UserId) -> AppResult<Option<User>>;

    /// Update the online flag and last-seen timestamp
    async fn set_presence(&self, id: UserId, online: bool, at: DateTime<Utc>) -> AppResult<()>;
}

/// Storage operations for chats, memberships, messages and receipts.
///
/// Membership rows are the only source of authorization: every caller checks
/// `is_member` before reading or writing on behalf of a user.
#[async_trait::async_trait]
pub trait ChatStore: Send + Sync {
    async fn is_member(&self, chat_id: ChatId, user_id: UserId) -> AppResult<bool>;

    /// All member ids of a chat
    async fn chat_members(&self, chat_id: ChatId) -> AppResult<Vec<UserId>>;

    /// Persist a message with a server timestamp and bump the unread counter
    /// of every member except the sender, as one unit.
    async fn insert_message(&self, message: NewMessage) -> AppResult<Message>;

    /// Refresh the denormalized last-message preview of a chat
    async fn update_chat_last_message(
        &self,
        chat_id: ChatId,
        content: &str,
        at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Insert or refresh the receipt for (message, reader). Returns `None` when
    /// the message does not belong to `chat_id`.
    async fn upsert_read_receipt(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Option<ReadReceipt>>;

    /// Chats of a user with unread counts and member presence, ordered by last
    /// message time descending (nulls last), then creation time descending.
    async fn list_chats_for_user(&self, user_id: UserId) -> AppResult<Vec<ChatListEntry>>;

    /// Chats of a user that have at least one other member
    async fn shared_chat_ids(&self, user_id: UserId) -> AppResult<Vec<ChatId>>;

    /// Existing private chat between two users, in either membership order
    async fn find_private_chat(&self, a: UserId, b: UserId) -> AppResult<Option<ChatId>>;

    /// Insert a chat and a membership row for every given member.
    ///
    /// For `ChatKind::Private` implementations must return the existing chat
    /// when one already links the same pair.
    async fn create_chat(
        &self,
        name: Option<&str>,
        kind: ChatKind,
        members: &[UserId],
    ) -> AppResult<ChatId>;

    /// A page of history, oldest first. `before` pages backwards by message id.
    async fn chat_history(
        &self,
        chat_id: ChatId,
        limit: i64,
        before: Option<MessageId>,
    ) -> AppResult<Vec<Message>>;

    /// Reset the unread counter of a member
    async fn mark_chat_read(&self, chat_id: ChatId, user_id: UserId) -> AppResult<()>;
}
