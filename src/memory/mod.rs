//! 记忆层：对话消息类型、跨步记忆存储（内存 / JSONL 文件 / SQLite）

pub mod async_persistence;
pub mod conversation;
pub mod persistence;
pub mod store;

#[cfg(feature = "async-sqlite")]
pub use async_persistence::SqliteMemoryStore;
pub use conversation::{Message, Role};
pub use persistence::JsonlMemoryStore;
pub use store::{
    format_entry, InMemoryStore, MemoryError, MemoryStore, RetentionPolicy, DEFAULT_MAX_ENTRIES,
};
