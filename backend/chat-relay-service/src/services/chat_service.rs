use crate::error::{AppError, AppResult};
use crate::models::{ChatId, ChatKind, UserId};
use crate::services::chat_store::{ChatStore, UserDirectory};
use serde::Deserialize;
use tracing::info;

/// Body of `POST /api/chats`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub participant_ids: Vec<UserId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: ChatKind,
}

pub struct ChatService;

impl ChatService {
    /// Create a chat between `creator` and the requested participants.
    ///
    /// Private chats are idempotent per unordered pair: a second request for
    /// the same pair returns the existing chat id.
    pub async fn create_chat(
        store: &dyn ChatStore,
        users: &dyn UserDirectory,
        creator: UserId,
        request: CreateChatRequest,
    ) -> AppResult<ChatId> {
        let mut participants: Vec<UserId> = request
            .participant_ids
            .into_iter()
            .filter(|id| *id != creator)
            .collect();
        participants.sort_unstable();
        participants.dedup();

        match (request.kind, participants.len()) {
            (_, 0) => {
                return Err(AppError::BadRequest(
                    "at least one participant other than the creator is required".into(),
                ))
            }
            (ChatKind::Private, n) if n != 1 => {
                return Err(AppError::BadRequest(
                    "a private chat takes exactly one participant".into(),
                ))
            }
            _ => {}
        }

        for id in &participants {
            if users.get_user_by_id(*id).await?.is_none() {
                return Err(AppError::NotFound(format!("user {id}")));
            }
        }

        if request.kind == ChatKind::Private {
            if let Some(existing) = store.find_private_chat(creator, participants[0]).await? {
                return Ok(existing);
            }
        }

        let name = request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let mut members = Vec::with_capacity(participants.len() + 1);
        members.push(creator);
        members.extend(participants);

        let chat_id = store.create_chat(name, request.kind, &members).await?;
        info!(chat_id, creator, kind = %request.kind, members = members.len(), "chat created");
        Ok(chat_id)
    }
}
