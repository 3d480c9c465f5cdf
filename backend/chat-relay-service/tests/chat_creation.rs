mod common;

use chat_relay_service::error::AppError;
use chat_relay_service::models::ChatKind;
use chat_relay_service::services::{ChatService, ChatStore, CreateChatRequest};
use common::MemoryStore;

fn request(participants: &[i64], kind: ChatKind, name: Option<&str>) -> CreateChatRequest {
    CreateChatRequest {
        participant_ids: participants.to_vec(),
        name: name.map(str::to_string),
        kind,
    }
}

fn store() -> std::sync::Arc<MemoryStore> {
    let store = MemoryStore::new();
    for (id, name) in [(1, "Ira"), (2, "Max"), (3, "Nadia")] {
        store.add_user(id, name);
    }
    store
}

#[tokio::test]
async fn test_private_chat_creation_is_idempotent() {
    let store = store();

    let first = ChatService::create_chat(&*store, &*store, 1, request(&[2], ChatKind::Private, None))
        .await
        .unwrap();
    let second = ChatService::create_chat(&*store, &*store, 1, request(&[2], ChatKind::Private, None))
        .await
        .unwrap();
    // Either side may start the chat
    let reversed = ChatService::create_chat(&*store, &*store, 2, request(&[1], ChatKind::Private, None))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first, reversed);
    assert_eq!(store.chat_count(), 1);
    assert!(store.is_member(first, 1).await.unwrap());
    assert!(store.is_member(first, 2).await.unwrap());
}

#[tokio::test]
async fn test_group_chat_includes_creator_and_participants() {
    let store = store();

    let chat = ChatService::create_chat(
        &*store,
        &*store,
        1,
        request(&[2, 3, 3, 1], ChatKind::Group, Some("  Thesis group ")),
    )
    .await
    .unwrap();

    let mut members = store.chat_members(chat).await.unwrap();
    members.sort_unstable();
    assert_eq!(members, vec![1, 2, 3]);

    let row = store.chat(chat).unwrap();
    assert_eq!(row.kind, ChatKind::Group);
    assert_eq!(row.name.as_deref(), Some("Thesis group"));
}

#[tokio::test]
async fn test_group_chats_are_not_deduplicated() {
    let store = store();
    let req = || request(&[2], ChatKind::Group, Some("Study"));

    let a = ChatService::create_chat(&*store, &*store, 1, req()).await.unwrap();
    let b = ChatService::create_chat(&*store, &*store, 1, req()).await.unwrap();

    assert_ne!(a, b);
}

#[tokio::test]
async fn test_unknown_participant_is_not_found() {
    let store = store();

    let result =
        ChatService::create_chat(&*store, &*store, 1, request(&[77], ChatKind::Private, None)).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert_eq!(store.chat_count(), 0);
}

#[tokio::test]
async fn test_invalid_participant_lists_are_rejected() {
    let store = store();

    let only_self =
        ChatService::create_chat(&*store, &*store, 1, request(&[1], ChatKind::Private, None)).await;
    let two_private =
        ChatService::create_chat(&*store, &*store, 1, request(&[2, 3], ChatKind::Private, None)).await;
    let empty_group =
        ChatService::create_chat(&*store, &*store, 1, request(&[], ChatKind::Group, None)).await;

    assert!(matches!(only_self, Err(AppError::BadRequest(_))));
    assert!(matches!(two_private, Err(AppError::BadRequest(_))));
    assert!(matches!(empty_group, Err(AppError::BadRequest(_))));
    assert_eq!(store.chat_count(), 0);
}
