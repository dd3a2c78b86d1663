//! LLM 层：客户端抽象与实现（OpenAI 兼容 / 供应商目录 / Mock）

pub mod mock;
pub mod openai;
pub mod provider;
pub mod traits;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use provider::{create_provider_client, Provider};
pub use traits::{LlmClient, LlmError};
