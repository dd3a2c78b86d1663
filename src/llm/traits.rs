//! LLM 客户端抽象
//!
//! 所有后端（Perplexity / Groq / OpenAI 兼容端点 / Mock）实现 LlmClient：一次 complete 即一次完整的模型往返。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// 模型往返失败（网络、鉴权、限流、响应格式异常等）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request failed: {0}")]
    Request(String),
}

/// LLM 客户端 trait：非流式完成，返回助手回复文本
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；响应没有文本内容时返回空串
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
