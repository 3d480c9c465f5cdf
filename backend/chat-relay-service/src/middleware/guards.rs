//! Authorization guards that enforce permission checks at the type level

use std::future::Future;
use std::pin::Pin;

use crate::error::AppError;
use crate::middleware::auth::bearer_token;
use crate::models::{ChatId, UserId};
use crate::services::ChatStore;
use crate::state::AppState;
use actix_web::{web, Error, FromRequest, HttpRequest};

/// Caller identity verified from the `Authorization` header
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub id: UserId,
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(bearer_token)
            .map(str::to_owned);

        Box::pin(async move {
            let state = state.ok_or(AppError::Internal)?;
            let token = token.ok_or(AppError::Unauthorized)?;
            let claims = state.verifier.verify(&token).await?;
            Ok(AuthenticatedUser {
                id: claims.user_id,
            })
        })
    }
}

/// A user proven to hold a membership row for a chat
#[derive(Debug, Clone, Copy)]
pub struct ChatMember {
    pub user_id: UserId,
    pub chat_id: ChatId,
}

impl ChatMember {
    pub async fn verify(
        store: &dyn ChatStore,
        user_id: UserId,
        chat_id: ChatId,
    ) -> Result<Self, AppError> {
        if !store.is_member(chat_id, user_id).await? {
            return Err(AppError::Forbidden);
        }
        Ok(ChatMember { user_id, chat_id })
    }
}
