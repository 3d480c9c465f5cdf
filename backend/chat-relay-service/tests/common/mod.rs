#![allow(dead_code)]

use async_trait::async_trait;
use chat_relay_service::config::Config;
use chat_relay_service::error::{AppError, AppResult};
use chat_relay_service::middleware::JwtVerifier;
use chat_relay_service::models::{
    chat::sort_chat_list, ChatId, ChatKind, ChatListEntry, ChatMemberSummary, Message, MessageId,
    NewMessage, ReadReceipt, User, UserId,
};
use chat_relay_service::services::{ChatStore, UserDirectory};
use chat_relay_service::state::AppState;
use chat_relay_service::websocket::session::ChatSession;
use chat_relay_service::websocket::{ConnectionHandle, ConnectionId, ConnectionRegistry, Outbound};
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

pub const TEST_SECRET: &str = "test-secret";

#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: ChatId,
    pub name: Option<String>,
    pub kind: ChatKind,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct MemberRow {
    chat_id: ChatId,
    user_id: UserId,
    unread_count: i64,
}

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    chats: HashMap<ChatId, ChatRow>,
    members: Vec<MemberRow>,
    messages: Vec<Message>,
    reads: HashMap<(MessageId, UserId), DateTime<Utc>>,
    next_chat_id: ChatId,
    next_message_id: MessageId,
    fail_inserts: bool,
    fail_presence: bool,
    insert_calls: usize,
}

/// In-memory stand-in for the Postgres store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, id: UserId, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.users.insert(
            id,
            User {
                id,
                name: name.to_string(),
                email: format!("{}@campus.test", name.to_lowercase()),
                role: "student".to_string(),
                avatar_url: None,
                is_online: false,
                last_seen: None,
            },
        );
    }

    /// Insert a chat directly, bypassing creation rules
    pub fn add_chat(&self, kind: ChatKind, name: Option<&str>, members: &[UserId]) -> ChatId {
        let mut inner = self.inner.lock().unwrap();
        Self::insert_chat(&mut inner, name, kind, members)
    }

    fn insert_chat(inner: &mut Inner, name: Option<&str>, kind: ChatKind, members: &[UserId]) -> ChatId {
        inner.next_chat_id += 1;
        let id = inner.next_chat_id;
        inner.chats.insert(
            id,
            ChatRow {
                id,
                name: name.map(str::to_string),
                kind,
                last_message: None,
                last_message_time: None,
                created_at: Utc::now(),
            },
        );
        for user_id in members {
            if !inner.members.iter().any(|m| m.chat_id == id && m.user_id == *user_id) {
                inner.members.push(MemberRow {
                    chat_id: id,
                    user_id: *user_id,
                    unread_count: 0,
                });
            }
        }
        id
    }

    pub fn chat(&self, id: ChatId) -> Option<ChatRow> {
        self.inner.lock().unwrap().chats.get(&id).cloned()
    }

    pub fn chat_count(&self) -> usize {
        self.inner.lock().unwrap().chats.len()
    }

    pub fn unread(&self, chat_id: ChatId, user_id: UserId) -> Option<i64> {
        self.inner
            .lock()
            .unwrap()
            .members
            .iter()
            .find(|m| m.chat_id == chat_id && m.user_id == user_id)
            .map(|m| m.unread_count)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().unwrap().messages.clone()
    }

    pub fn insert_calls(&self) -> usize {
        self.inner.lock().unwrap().insert_calls
    }

    pub fn receipts(&self) -> Vec<(MessageId, UserId, DateTime<Utc>)> {
        self.inner
            .lock()
            .unwrap()
            .reads
            .iter()
            .map(|((m, u), at)| (*m, *u, *at))
            .collect()
    }

    pub fn presence(&self, id: UserId) -> Option<(bool, Option<DateTime<Utc>>)> {
        self.inner
            .lock()
            .unwrap()
            .users
            .get(&id)
            .map(|u| (u.is_online, u.last_seen))
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.inner.lock().unwrap().fail_inserts = fail;
    }

    pub fn set_fail_presence(&self, fail: bool) {
        self.inner.lock().unwrap().fail_presence = fail;
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_user_by_id(&self, id: UserId) -> AppResult<Option<User>> {
        Ok(self.inner.lock().unwrap().users.get(&id).cloned())
    }

    async fn set_presence(&self, id: UserId, online: bool, at: DateTime<Utc>) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_presence {
            return Err(AppError::Database("connection reset".into()));
        }
        if let Some(user) = inner.users.get_mut(&id) {
            user.is_online = online;
            user.last_seen = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn is_member(&self, chat_id: ChatId, user_id: UserId) -> AppResult<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .members
            .iter()
            .any(|m| m.chat_id == chat_id && m.user_id == user_id))
    }

    async fn chat_members(&self, chat_id: ChatId) -> AppResult<Vec<UserId>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .members
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| m.user_id)
            .collect())
    }

    async fn insert_message(&self, message: NewMessage) -> AppResult<Message> {
        let mut inner = self.inner.lock().unwrap();
        inner.insert_calls += 1;
        if inner.fail_inserts {
            return Err(AppError::Database("connection reset".into()));
        }

        inner.next_message_id += 1;
        let stored = Message {
            id: inner.next_message_id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            content: message.content,
            kind: message.kind,
            reply_to: message.reply_to,
            attachment: message.attachment,
            created_at: Utc::now(),
        };
        for member in inner.members.iter_mut() {
            if member.chat_id == message.chat_id && member.user_id != message.sender_id {
                member.unread_count += 1;
            }
        }
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    async fn update_chat_last_message(
        &self,
        chat_id: ChatId,
        content: &str,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        if let Some(chat) = self.inner.lock().unwrap().chats.get_mut(&chat_id) {
            chat.last_message = Some(content.to_string());
            chat.last_message_time = Some(at);
        }
        Ok(())
    }

    async fn upsert_read_receipt(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Option<ReadReceipt>> {
        let mut inner = self.inner.lock().unwrap();
        let in_chat = inner
            .messages
            .iter()
            .any(|m| m.id == message_id && m.chat_id == chat_id);
        if !in_chat {
            return Ok(None);
        }
        inner.reads.insert((message_id, user_id), at);
        Ok(Some(ReadReceipt {
            message_id,
            user_id,
            read_at: at,
        }))
    }

    async fn list_chats_for_user(&self, user_id: UserId) -> AppResult<Vec<ChatListEntry>> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<ChatListEntry> = inner
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| inner.chats.get(&m.chat_id).map(|c| (c, m.unread_count)))
            .map(|(chat, unread)| {
                let roster = inner
                    .members
                    .iter()
                    .filter(|m| m.chat_id == chat.id)
                    .filter_map(|m| inner.users.get(&m.user_id))
                    .map(|u| ChatMemberSummary {
                        id: u.id,
                        name: u.name.clone(),
                        avatar_url: u.avatar_url.clone(),
                        is_online: u.is_online,
                        last_seen: u.last_seen,
                    })
                    .collect();
                ChatListEntry {
                    id: chat.id,
                    name: chat.name.clone(),
                    kind: chat.kind,
                    last_message: chat.last_message.clone(),
                    last_message_time: chat.last_message_time,
                    unread_count: unread,
                    created_at: chat.created_at,
                    participant: None,
                    members: None,
                }
                .with_members(user_id, roster)
            })
            .collect();
        sort_chat_list(&mut entries);
        Ok(entries)
    }

    async fn shared_chat_ids(&self, user_id: UserId) -> AppResult<Vec<ChatId>> {
        let inner = self.inner.lock().unwrap();
        let mut ids: Vec<ChatId> = inner
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| m.chat_id)
            .filter(|chat_id| {
                inner
                    .members
                    .iter()
                    .any(|o| o.chat_id == *chat_id && o.user_id != user_id)
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn find_private_chat(&self, a: UserId, b: UserId) -> AppResult<Option<ChatId>> {
        let inner = self.inner.lock().unwrap();
        let mut ids: Vec<ChatId> = inner
            .chats
            .values()
            .filter(|c| c.kind == ChatKind::Private)
            .map(|c| c.id)
            .filter(|id| {
                let has = |u: UserId| inner.members.iter().any(|m| m.chat_id == *id && m.user_id == u);
                has(a) && has(b)
            })
            .collect();
        ids.sort_unstable();
        Ok(ids.first().copied())
    }

    async fn create_chat(
        &self,
        name: Option<&str>,
        kind: ChatKind,
        members: &[UserId],
    ) -> AppResult<ChatId> {
        if kind == ChatKind::Private && members.len() == 2 {
            if let Some(existing) = self.find_private_chat(members[0], members[1]).await? {
                return Ok(existing);
            }
        }
        let mut inner = self.inner.lock().unwrap();
        Ok(Self::insert_chat(&mut inner, name, kind, members))
    }

    async fn chat_history(
        &self,
        chat_id: ChatId,
        limit: i64,
        before: Option<MessageId>,
    ) -> AppResult<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        let mut page: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id && before.map_or(true, |b| m.id < b))
            .cloned()
            .collect();
        page.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        page.truncate(limit.max(0) as usize);
        page.reverse();
        Ok(page)
    }

    async fn mark_chat_read(&self, chat_id: ChatId, user_id: UserId) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for member in inner.members.iter_mut() {
            if member.chat_id == chat_id && member.user_id == user_id {
                member.unread_count = 0;
            }
        }
        Ok(())
    }
}

pub fn test_state(store: Arc<MemoryStore>) -> AppState {
    let config = Config::test_defaults();
    let verifier = JwtVerifier::from_key(&config.jwt_key).unwrap();
    AppState {
        store: store.clone(),
        users: store,
        verifier: Arc::new(verifier),
        registry: ConnectionRegistry::new(),
        config: Arc::new(config),
    }
}

pub fn token_for(user_id: UserId) -> String {
    let claims = json!({
        "sub": user_id.to_string(),
        "exp": Utc::now().timestamp() + 3600,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Everything queued on a connection since the last drain
#[derive(Debug, Default)]
pub struct Drained {
    pub frames: Vec<Value>,
    pub closed: bool,
}

impl Drained {
    pub fn types(&self) -> Vec<String> {
        self.frames
            .iter()
            .map(|f| f["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn of_type(&self, kind: &str) -> Vec<&Value> {
        self.frames.iter().filter(|f| f["type"] == kind).collect()
    }
}

/// A session plus the receiving end of its connection
pub struct Client {
    pub session: ChatSession,
    pub rx: UnboundedReceiver<Outbound>,
    pub connection_id: ConnectionId,
}

impl Client {
    pub fn new(state: &AppState) -> Self {
        let (handle, rx) = ConnectionHandle::channel();
        let connection_id = handle.id;
        Self {
            session: ChatSession::new(state.clone(), handle),
            rx,
            connection_id,
        }
    }

    pub fn drain(&mut self) -> Drained {
        let mut drained = Drained::default();
        while let Ok(item) = self.rx.try_recv() {
            match item {
                Outbound::Frame(text) => drained.frames.push(serde_json::from_str(&text).unwrap()),
                Outbound::Close => drained.closed = true,
            }
        }
        drained
    }

    pub async fn send(&mut self, frame: Value) {
        self.session.dispatch(&frame.to_string()).await;
    }
}

/// Open an authenticated session for `user_id` and discard its greeting frames
pub async fn connect(state: &AppState, user_id: UserId) -> Client {
    let mut client = Client::new(state);
    client.session.open(Some(token_for(user_id).as_str())).await;
    client.drain();
    client
}
