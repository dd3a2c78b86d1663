//! 模型供应商目录
//!
//! Perplexity / Groq / OpenAI 均提供 OpenAI 兼容接口，区别仅在 Base URL、凭据环境变量与可选模型。
//! - Perplexity: https://api.perplexity.ai （sonar, sonar-pro）
//! - Groq: https://api.groq.com/openai/v1 （llama / mixtral 系列）
//! - OpenAI: 官方端点（gpt-4o 系列）

use std::fmt;
use std::str::FromStr;

use crate::core::AgentError;
use crate::llm::OpenAiClient;

pub const PERPLEXITY_BASE_URL: &str = "https://api.perplexity.ai";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// 支持的模型供应商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Perplexity,
    Groq,
    OpenAi,
}

impl Provider {
    /// 固定顺序，决定「可用供应商」列表的排列
    pub const ALL: [Provider; 3] = [Provider::Perplexity, Provider::Groq, Provider::OpenAi];

    pub fn name(self) -> &'static str {
        match self {
            Provider::Perplexity => "Perplexity",
            Provider::Groq => "Groq",
            Provider::OpenAi => "OpenAI",
        }
    }

    /// 读取凭据的环境变量名
    pub fn credential_env(self) -> &'static str {
        match self {
            Provider::Perplexity => "PERPLEXITY_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }

    /// None 表示使用 async_openai 默认的 OpenAI 端点
    pub fn base_url(self) -> Option<&'static str> {
        match self {
            Provider::Perplexity => Some(PERPLEXITY_BASE_URL),
            Provider::Groq => Some(GROQ_BASE_URL),
            Provider::OpenAi => None,
        }
    }

    /// 可选模型；第一个为默认模型
    pub fn models(self) -> &'static [&'static str] {
        match self {
            Provider::Perplexity => &["sonar", "sonar-pro"],
            Provider::Groq => &[
                "llama-3.3-70b-versatile",
                "llama3-8b-8192",
                "mixtral-8x7b-32768",
            ],
            Provider::OpenAi => &["gpt-4o", "gpt-4o-mini", "gpt-3.5-turbo"],
        }
    }

    pub fn default_model(self) -> &'static str {
        self.models()[0]
    }

    pub fn supports(self, model: &str) -> bool {
        self.models().contains(&model)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "perplexity" | "pplx" => Ok(Provider::Perplexity),
            "groq" => Ok(Provider::Groq),
            "openai" => Ok(Provider::OpenAi),
            _ => Err(AgentError::UnknownProvider(s.to_string())),
        }
    }
}

/// 创建供应商客户端：校验 (provider, model) 组合与凭据，不做任何静默回退
///
/// base_url_override 来自配置 [llm].base_url，用于自建代理
pub fn create_provider_client(
    provider: Provider,
    model: &str,
    credential: &str,
    base_url_override: Option<&str>,
) -> Result<OpenAiClient, AgentError> {
    if credential.trim().is_empty() {
        return Err(AgentError::MissingCredential(provider));
    }
    if !provider.supports(model) {
        return Err(AgentError::UnsupportedModel {
            provider,
            model: model.to_string(),
        });
    }
    let base = base_url_override.or(provider.base_url());
    tracing::info!("Using {} LLM ({})", provider, model);
    Ok(OpenAiClient::new(base, model, credential))
}
