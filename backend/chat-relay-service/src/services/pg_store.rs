use crate::error::{AppError, AppResult};
use crate::models::{
    chat::sort_chat_list, ChatId, ChatKind, ChatListEntry, ChatMemberSummary, Message,
    MessageId, MessageKind, NewMessage, ReadReceipt, User, UserId,
};
use crate::services::chat_store::{ChatStore, UserDirectory};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::debug;

/// PostgreSQL implementation of the persistence gateway
#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Health check
    pub async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Advisory lock key for the private chat between two users, order independent
fn private_chat_lock_key(a: UserId, b: UserId) -> String {
    format!("private_chat:{}:{}", a.min(b), a.max(b))
}

fn message_from_row(row: &PgRow) -> AppResult<Message> {
        let kind: String = row.try_get("type")?;
        Ok(Message {
            id: row.try_get("id")?,
            chat_id: row.try_get("chat_id")?,
            sender_id: row.try_get("sender_id")?,
            content: row.try_get("content")?,
            kind: MessageKind::from_db(&kind)
                .ok_or_else(|| AppError::Database(format!("unknown message type {kind}")))?,
            reply_to: row.try_get("reply_to")?,
            attachment: row.try_get("attachment")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait::async_trait]
impl UserDirectory for PgChatStore {
    async fn get_user_by_id(&self, id: UserId) -> AppResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, role, avatar_url, is_online, last_seen
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(User {
                id: r.try_get("id")?,
                name: r.try_get("name")?,
                email: r.try_get("email")?,
                role: r.try_get("role")?,
                avatar_url: r.try_get("avatar_url")?,
                is_online: r.try_get("is_online")?,
                last_seen: r.try_get("last_seen")?,
            })
        })
        .transpose()
    }

    async fn set_presence(&self, id: UserId, online: bool, at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE users SET is_online = $2, last_seen = $3 WHERE id = $1")
            .bind(id)
            .bind(online)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChatStore for PgChatStore {
    async fn is_member(&self, chat_id: ChatId, user_id: UserId) -> AppResult<bool> {
        let rec = sqlx::query("SELECT 1 FROM chat_members WHERE chat_id = $1 AND user_id = $2 LIMIT 1")
            .bind(chat_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec.is_some())
    }

    async fn chat_members(&self, chat_id: ChatId) -> AppResult<Vec<UserId>> {
        let ids: Vec<UserId> =
            sqlx::query_scalar("SELECT user_id FROM chat_members WHERE chat_id = $1")
                .bind(chat_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    async fn insert_message(&self, message: NewMessage) -> AppResult<Message> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO messages (chat_id, sender_id, content, type, reply_to, attachment)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, chat_id, sender_id, content, type, reply_to, attachment, created_at
            "#,
        )
        .bind(message.chat_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.kind.to_db())
        .bind(message.reply_to)
        .bind(&message.attachment)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE chat_members SET unread_count = unread_count + 1 WHERE chat_id = $1 AND user_id <> $2",
        )
        .bind(message.chat_id)
        .bind(message.sender_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Self::message_from_row(&row)
    }

    async fn update_chat_last_message(
        &self,
        chat_id: ChatId,
        content: &str,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE chats SET last_message = $2, last_message_time = $3 WHERE id = $1")
            .bind(chat_id)
            .bind(content)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_read_receipt(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Option<ReadReceipt>> {
        let row = sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, user_id, read_at)
            SELECT m.id, $2, $3
            FROM messages m
            WHERE m.id = $1 AND m.chat_id = $4
            ON CONFLICT (message_id, user_id) DO UPDATE SET read_at = EXCLUDED.read_at
            RETURNING message_id, user_id, read_at
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .bind(at)
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(ReadReceipt {
            message_id: row.try_get("message_id")?,
            user_id: row.try_get("user_id")?,
            read_at: row.try_get("read_at")?,
        }))
    }

    async fn list_chats_for_user(&self, user_id: UserId) -> AppResult<Vec<ChatListEntry>> {
        let chat_rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.type, c.last_message, c.last_message_time, c.created_at,
                   cm.unread_count
            FROM chats c
            JOIN chat_members cm ON cm.chat_id = c.id AND cm.user_id = $1
            ORDER BY c.last_message_time DESC NULLS LAST, c.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        if chat_rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::with_capacity(chat_rows.len());
        for row in &chat_rows {
            let kind: String = row.try_get("type")?;
            let unread: i32 = row.try_get("unread_count")?;
            entries.push(ChatListEntry {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                kind: ChatKind::from_db(&kind)
                    .ok_or_else(|| AppError::Database(format!("unknown chat type {kind}")))?,
                last_message: row.try_get("last_message")?,
                last_message_time: row.try_get("last_message_time")?,
                unread_count: i64::from(unread),
                created_at: row.try_get("created_at")?,
                participant: None,
                members: None,
            });
        }

        // One roster query for every chat instead of one per chat
        let chat_ids: Vec<ChatId> = entries.iter().map(|e| e.id).collect();
        let member_rows = sqlx::query(
            r#"
            SELECT cm.chat_id, u.id, u.name, u.avatar_url, u.is_online, u.last_seen
            FROM chat_members cm
            JOIN users u ON u.id = cm.user_id
            WHERE cm.chat_id = ANY($1)
            ORDER BY cm.joined_at ASC
            "#,
        )
        .bind(&chat_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut rosters: HashMap<ChatId, Vec<ChatMemberSummary>> = HashMap::new();
        for row in &member_rows {
            let chat_id: ChatId = row.try_get("chat_id")?;
            rosters.entry(chat_id).or_default().push(ChatMemberSummary {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                avatar_url: row.try_get("avatar_url")?,
                is_online: row.try_get("is_online")?,
                last_seen: row.try_get("last_seen")?,
            });
        }

        let mut entries: Vec<ChatListEntry> = entries
            .into_iter()
            .map(|e| {
                let roster = rosters.remove(&e.id).unwrap_or_default();
                e.with_members(user_id, roster)
            })
            .collect();
        sort_chat_list(&mut entries);

        debug!(user_id, chats = entries.len(), "loaded chat list");
        Ok(entries)
    }

    async fn shared_chat_ids(&self, user_id: UserId) -> AppResult<Vec<ChatId>> {
        let ids: Vec<ChatId> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT cm.chat_id
            FROM chat_members cm
            JOIN chat_members other ON other.chat_id = cm.chat_id AND other.user_id <> cm.user_id
            WHERE cm.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn find_private_chat(&self, a: UserId, b: UserId) -> AppResult<Option<ChatId>> {
        let id: Option<ChatId> = sqlx::query_scalar(
            r#"
            SELECT c.id
            FROM chats c
            JOIN chat_members ma ON ma.chat_id = c.id AND ma.user_id = $1
            JOIN chat_members mb ON mb.chat_id = c.id AND mb.user_id = $2
            WHERE c.type = 'private'
            ORDER BY c.id ASC
            LIMIT 1
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn create_chat(
        &self,
        name: Option<&str>,
        kind: ChatKind,
        members: &[UserId],
    ) -> AppResult<ChatId> {
        let mut tx = self.pool.begin().await?;

        if kind == ChatKind::Private {
            let (a, b) = match members {
                [a, b] => (*a.min(b), *a.max(b)),
                _ => {
                    return Err(AppError::BadRequest(
                        "a private chat has exactly two members".into(),
                    ))
                }
            };

            // Serialize concurrent creations for the same pair, then re-check
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(Self::private_chat_lock_key(a, b))
                .execute(&mut *tx)
                .await?;

            let existing: Option<ChatId> = sqlx::query_scalar(
                r#"
                SELECT c.id
                FROM chats c
                JOIN chat_members ma ON ma.chat_id = c.id AND ma.user_id = $1
                JOIN chat_members mb ON mb.chat_id = c.id AND mb.user_id = $2
                WHERE c.type = 'private'
                LIMIT 1
                "#,
            )
            .bind(a)
            .bind(b)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(id) = existing {
                tx.commit().await?;
                return Ok(id);
            }
        }

        let chat_id: ChatId =
            sqlx::query_scalar("INSERT INTO chats (name, type) VALUES ($1, $2) RETURNING id")
                .bind(name)
                .bind(kind.to_db())
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO chat_members (chat_id, user_id)
            SELECT $1, member_id FROM UNNEST($2::bigint[]) AS member_id
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(chat_id)
        .bind(members)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(chat_id, kind = %kind, members = members.len(), "created chat");
        Ok(chat_id)
    }

    async fn chat_history(
        &self,
        chat_id: ChatId,
        limit: i64,
        before: Option<MessageId>,
    ) -> AppResult<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, chat_id, sender_id, content, type, reply_to, attachment, created_at
            FROM (
                SELECT id, chat_id, sender_id, content, type, reply_to, attachment, created_at
                FROM messages
                WHERE chat_id = $1 AND ($3::bigint IS NULL OR id < $3)
                ORDER BY created_at DESC, id DESC
                LIMIT $2
            ) page
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(chat_id)
        .bind(limit)
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::message_from_row).collect()
    }

    async fn mark_chat_read(&self, chat_id: ChatId, user_id: UserId) -> AppResult<()> {
        sqlx::query("UPDATE chat_members SET unread_count = 0 WHERE chat_id = $1 AND user_id = $2")
            .bind(chat_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_ignores_member_order() {
        assert_eq!(PgChatStore::private_chat_lock_key(7, 3), PgChatStore::private_chat_lock_key(3, 7));
    }

    #[test]
    fn test_lock_key_keeps_full_width_ids() {
        // Ids that agree in their low 32 bits still lock separately
        let low = PgChatStore::private_chat_lock_key(1, 2);
        let high = PgChatStore::private_chat_lock_key(1, 2 + (1_i64 << 32));
        assert_ne!(low, high);
        assert_eq!(high, format!("private_chat:1:{}", 2 + (1_i64 << 32)));
    }
}
