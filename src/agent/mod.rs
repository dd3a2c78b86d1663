//! Agent 层：角色、Agent 句柄、按键缓存

pub mod cache;
pub mod handle;
pub mod role;

pub use cache::{AgentCache, AgentKey, ClientFactory, ProviderClientFactory};
pub use handle::Agent;
pub use role::AgentRole;
