//! Agent 句柄：{模型客户端, 角色指令, 持久化命名空间} 的绑定
//!
//! run 按 [system 指令, 本会话历史..., 当前提示] 调用模型，成功后把提示与回复写入本角色的存储。
//! run_as 允许发送的提示与存储的提示不同（如附带文档上下文时只存原始提示）。

use std::sync::Arc;

use crate::agent::AgentRole;
use crate::llm::{LlmClient, LlmError};
use crate::memory::{AgentStore, Message};

pub struct Agent {
    role: AgentRole,
    llm: Arc<dyn LlmClient>,
    store: AgentStore,
    instructions: String,
    history_turns: usize,
}

impl Agent {
    pub fn new(role: AgentRole, llm: Arc<dyn LlmClient>, store: AgentStore, history_turns: usize) -> Self {
        Self {
            role,
            llm,
            store,
            instructions: role.instructions(),
            history_turns,
        }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// 本角色的持久化存储（同一缓存键的所有调用方共享）
    pub fn store(&self) -> &AgentStore {
        &self.store
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    fn build_messages(&self, session_id: &str, prompt: &str) -> Vec<Message> {
        let mut messages = vec![Message::system(self.instructions.clone())];
        if self.history_turns > 0 {
            match self.store.history(session_id, Some(self.history_turns * 2)) {
                Ok(history) => messages.extend(history),
                Err(e) => tracing::warn!(role = %self.role, "Failed to load history: {}", e),
            }
        }
        messages.push(Message::user(prompt));
        messages
    }

    /// 一次阻塞式模型往返；不重试，失败直接返回
    pub async fn run(&self, session_id: &str, prompt: &str) -> Result<String, LlmError> {
        self.run_as(session_id, prompt, prompt).await
    }

    /// 发送 prompt，但在历史中记为 persisted_prompt
    ///
    /// 持久化写入失败只记日志，不影响已拿到的回复
    pub async fn run_as(
        &self,
        session_id: &str,
        prompt: &str,
        persisted_prompt: &str,
    ) -> Result<String, LlmError> {
        let messages = self.build_messages(session_id, prompt);
        tracing::debug!(role = %self.role, messages = messages.len(), "Agent run");
        let content = self.llm.complete(&messages).await?;

        for msg in [Message::user(persisted_prompt), Message::assistant(content.clone())] {
            if let Err(e) = self.store.append(session_id, &msg) {
                tracing::warn!(role = %self.role, "Failed to persist {} message: {}", msg.role.as_str(), e);
            }
        }
        Ok(content)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("role", &self.role)
            .field("table", &self.store.table())
            .field("history_turns", &self.history_turns)
            .finish()
    }
}
