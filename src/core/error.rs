//! 核心错误类型
//!
//! 配置类错误（不支持的供应商/模型、缺少凭据、存储无法打开）在任何模型调用前暴露给调用方；
//! ProviderCall 为单次模型往返失败，由编排器在回合边界处理。

use thiserror::Error;

use crate::llm::{LlmError, Provider};
use crate::memory::StoreError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    Configuration(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Missing credential for provider {0}")]
    MissingCredential(Provider),

    #[error("Unsupported model {model} for provider {provider}")]
    UnsupportedModel { provider: Provider, model: String },

    #[error("Provider call failed: {0}")]
    ProviderCall(#[from] LlmError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl AgentError {
    /// 是否属于配置类错误（回合开始前即失败，不可重试）
    pub fn is_configuration(&self) -> bool {
        !matches!(self, AgentError::ProviderCall(_))
    }
}
