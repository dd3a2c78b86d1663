//! Paramodus - 多角色对话助手
//!
//! 模块划分：
//! - **agent**: Agent 角色、句柄与按键缓存
//! - **config**: 应用配置加载（TOML + 环境变量）与凭据发现
//! - **core**: 错误类型、会话状态、回合编排（主对话 + 任务提取 + 性格分析）
//! - **llm**: LLM 客户端抽象与实现（Perplexity / Groq / OpenAI 兼容 / Mock）
//! - **memory**: 对话消息与按角色命名空间的 SQLite 持久化
//! - **observability**: 日志初始化
//! - **render**: LaTeX 定界符规范化与 prose / math 切分
//! - **tasks**: 任务模型、提取与去重

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod render;
pub mod tasks;

pub use crate::core::{Orchestrator, SessionState};
