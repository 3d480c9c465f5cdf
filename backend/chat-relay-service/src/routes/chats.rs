use crate::error::AppError;
use crate::middleware::{AuthenticatedUser, ChatMember};
use crate::models::{ChatId, MessageId};
use crate::services::{ChatService, CreateChatRequest};
use crate::state::AppState;
use crate::websocket::broadcast::{refresh_chat_list_for_participants, refresh_chat_list_for_user};
use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatResponse {
    pub chat_id: ChatId,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub before: Option<MessageId>,
}

/// Create a chat
/// POST /api/chats
#[post("/chats")]
pub async fn create_chat(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<CreateChatRequest>,
) -> Result<HttpResponse, AppError> {
    let chat_id = ChatService::create_chat(
        state.store.as_ref(),
        state.users.as_ref(),
        user.id,
        body.into_inner(),
    )
    .await?;

    if let Err(e) = refresh_chat_list_for_participants(&state, chat_id).await {
        tracing::warn!(chat_id, error = %e, "chat list refresh after create failed");
    }

    Ok(HttpResponse::Created().json(CreateChatResponse { chat_id }))
}

/// Chat list of the caller
/// GET /api/chats
#[get("/chats")]
pub async fn list_chats(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let chats = state.store.list_chats_for_user(user.id).await?;
    Ok(HttpResponse::Ok().json(chats))
}

/// Message history, oldest first
/// GET /api/chats/{id}/messages?limit=&before=
#[get("/chats/{id}/messages")]
pub async fn chat_history(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<ChatId>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, AppError> {
    let member = ChatMember::verify(state.store.as_ref(), user.id, path.into_inner()).await?;

    let max = state.config.history_page_size;
    let limit = query.limit.unwrap_or(max).clamp(1, max);
    let messages = state
        .store
        .chat_history(member.chat_id, limit, query.before)
        .await?;

    Ok(HttpResponse::Ok().json(messages))
}

/// Reset the caller's unread counter
/// POST /api/chats/{id}/read
#[post("/chats/{id}/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<ChatId>,
) -> Result<HttpResponse, AppError> {
    let member = ChatMember::verify(state.store.as_ref(), user.id, path.into_inner()).await?;
    state
        .store
        .mark_chat_read(member.chat_id, member.user_id)
        .await?;

    if let Err(e) = refresh_chat_list_for_user(&state, user.id).await {
        tracing::warn!(user_id = user.id, error = %e, "chat list refresh after read failed");
    }

    Ok(HttpResponse::NoContent().finish())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(create_chat)
        .service(list_chats)
        .service(chat_history)
        .service(mark_read);
}
