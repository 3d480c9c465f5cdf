pub mod chat_service;
pub mod chat_store;
pub mod pg_store;

pub use chat_service::{ChatService, CreateChatRequest};
pub use chat_store::{ChatStore, UserDirectory};
pub use pg_store::PgChatStore;
