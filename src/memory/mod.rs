//! 记忆层：对话消息与按角色命名空间的持久化

pub mod conversation;
pub mod persistence;

pub use conversation::{Message, Role};
pub use persistence::{is_valid_table_name, AgentStore, StoreError};
