//! 记忆层：消息、分层存储（short_term / long_term）、淘汰归档

pub mod archive;
pub mod message;
pub mod store;

pub use archive::MemoryArchive;
pub use message::{ActionKind, Message, MessageId, RoleId};
pub use store::{EntryId, MemoryEntry, MemoryStore, MemoryTier};
