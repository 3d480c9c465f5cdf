//! Per-connection protocol state.
//!
//! A `ChatSession` is owned one-to-one by a physical connection and knows
//! nothing about the transport: everything it says goes through its
//! `ConnectionHandle`. Lifecycle:
//!
//! ```text
//! Unauthenticated --authenticate ok--> Authenticated --close--> Closed
//!        |                                                        ^
//!        +----------- missing/invalid token, or close ------------+
//! ```

use crate::models::{PublicUser, UserId};
use crate::state::AppState;
use crate::websocket::broadcast::{deliver, push_chat_list};
use crate::websocket::message_types::{
    AuthPayload, ClientFrame, ErrorCode, ServerFrame, MSG_BINARY_UNSUPPORTED, MSG_INVALID_TOKEN,
    MSG_NOT_AUTHENTICATED, MSG_TOKEN_REQUIRED,
};
use crate::websocket::{presence, router, ConnectionHandle};
use tracing::{debug, info, warn};

/// Identity bound to a session after authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: UserId,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(SessionUser),
    Closed,
}

pub struct ChatSession {
    app: AppState,
    handle: ConnectionHandle,
    state: SessionState,
}

impl ChatSession {
    pub fn new(app: AppState, handle: ConnectionHandle) -> Self {
        Self {
            app,
            handle,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn user(&self) -> Option<&SessionUser> {
        match &self.state {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// Entry point for a freshly accepted connection carrying an optional
    /// `token` query parameter.
    pub async fn open(&mut self, token: Option<&str>) {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => self.authenticate(token).await,
            None => {
                debug!(connection_id = %self.handle.id, "connection without token");
                self.fail(MSG_TOKEN_REQUIRED, ErrorCode::AuthRequired);
            }
        }
    }

    pub async fn authenticate(&mut self, token: &str) {
        if self.state != SessionState::Unauthenticated {
            return;
        }

        let claims = match self.app.verifier.verify(token).await {
            Ok(claims) => claims,
            Err(e) => {
                debug!(connection_id = %self.handle.id, error = %e, "token rejected");
                self.fail(MSG_INVALID_TOKEN, ErrorCode::InvalidToken);
                return;
            }
        };

        let user = match self.app.users.get_user_by_id(claims.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                debug!(user_id = claims.user_id, "token for unknown user");
                self.fail(MSG_INVALID_TOKEN, ErrorCode::InvalidToken);
                return;
            }
            Err(e) => {
                warn!(user_id = claims.user_id, error = %e, "user lookup failed");
                self.fail(MSG_INVALID_TOKEN, ErrorCode::InvalidToken);
                return;
            }
        };

        self.app.registry.set(user.id, self.handle.clone()).await;
        self.state = SessionState::Authenticated(SessionUser {
            id: user.id,
            name: user.name.clone(),
            role: user.role.clone(),
        });
        info!(user_id = user.id, connection_id = %self.handle.id, "client authenticated");

        deliver(
            &self.handle,
            &ServerFrame::Auth(AuthPayload {
                success: true,
                user: PublicUser::from(&user),
            }),
        );

        if let Err(e) = push_chat_list(&self.app, user.id, &self.handle).await {
            warn!(user_id = user.id, error = %e, "initial chat list failed");
        }
        if let Err(e) = presence::on_connect(&self.app, user.id).await {
            warn!(user_id = user.id, error = %e, "online presence failed");
        }
    }

    /// Handle one inbound text frame
    pub async fn dispatch(&mut self, text: &str) {
        let Some(user) = self.user().cloned() else {
            self.reply(ServerFrame::error(MSG_NOT_AUTHENTICATED, ErrorCode::NotAuthenticated));
            return;
        };

        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(user_id = user.id, error = %e, "rejected frame");
                self.reply(e.to_frame());
                return;
            }
        };

        match frame {
            ClientFrame::SendMessage(payload) => {
                router::send_message(&self.app, &user, &self.handle, payload).await
            }
            ClientFrame::Typing(payload) => router::typing(&self.app, &user, payload).await,
            ClientFrame::ReadReceipt(payload) => {
                router::read_receipt(&self.app, &user, payload).await
            }
            ClientFrame::ChatList => {
                if let Err(e) = push_chat_list(&self.app, user.id, &self.handle).await {
                    warn!(user_id = user.id, error = %e, "chat list request failed");
                }
            }
        }
    }

    /// Binary frames are not part of the protocol
    pub fn dispatch_binary(&self) {
        self.reply(ServerFrame::error(MSG_BINARY_UNSUPPORTED, ErrorCode::Unsupported));
    }

    /// Transport closed, by either side. Safe to call more than once.
    pub async fn close(&mut self) {
        let previous = std::mem::replace(&mut self.state, SessionState::Closed);
        let SessionState::Authenticated(user) = previous else {
            return;
        };

        // A newer connection of the same user keeps the user online
        if !self.app.registry.remove(user.id, self.handle.id).await {
            debug!(user_id = user.id, connection_id = %self.handle.id, "replaced connection closed");
            return;
        }

        info!(user_id = user.id, connection_id = %self.handle.id, "client disconnected");
        if let Err(e) = presence::on_disconnect(&self.app, user.id).await {
            warn!(user_id = user.id, error = %e, "offline presence failed");
        }
    }

    fn reply(&self, frame: ServerFrame) {
        deliver(&self.handle, &frame);
    }

    /// Fatal path: error frame, then close the transport
    fn fail(&mut self, message: &str, code: ErrorCode) {
        self.reply(ServerFrame::error(message, code));
        self.handle.close();
        self.state = SessionState::Closed;
    }
}
