//! 记忆层：会话对话历史、长期记忆、情感状态与 JSON 持久化

pub mod affect;
pub mod conversation;
pub mod long_term;
pub mod persistence;

pub use affect::{AffectDelta, AffectParam, AffectState, AffectStore};
pub use conversation::{ConversationMemory, Message, Role};
pub use long_term::{FileLongTerm, LongTermMemory, MemoryEntry};
pub use persistence::{write_atomic, JsonFile};
