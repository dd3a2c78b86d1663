//! Agent 缓存：每个 (provider, model, credential, role[, scope]) 只构建一次 Agent
//!
//! 首次请求某个键时创建模型客户端并打开该角色的存储，之后同键请求返回同一个 Arc<Agent>。
//! 缓存进程内有效，不按时间过期，只能通过 reset 显式清空（如「新对话」）；
//! 会话独占的 Agent 可用 evict_scope 按会话丢弃。

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::agent::{Agent, AgentRole};
use crate::config::{ModelSelection, StorageSection};
use crate::core::AgentError;
use crate::llm::{create_provider_client, LlmClient, Provider};
use crate::memory::AgentStore;

/// 缓存键；scope 为 Some(session_id) 时该会话独占一组 Agent
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AgentKey {
    pub provider: Provider,
    pub model: String,
    pub credential: String,
    pub role: AgentRole,
    pub scope: Option<String>,
}

impl AgentKey {
    pub fn new(selection: &ModelSelection, role: AgentRole) -> Self {
        Self {
            provider: selection.provider,
            model: selection.model.clone(),
            credential: selection.credential.clone(),
            role,
            scope: None,
        }
    }

    pub fn scoped(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

impl fmt::Debug for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentKey")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("credential", &"<redacted>")
            .field("role", &self.role)
            .field("scope", &self.scope)
            .finish()
    }
}

/// 模型客户端构造器（外部协作者）；测试中可替换为 Mock
pub trait ClientFactory: Send + Sync {
    fn create(
        &self,
        provider: Provider,
        model: &str,
        credential: &str,
    ) -> Result<Arc<dyn LlmClient>, AgentError>;
}

/// 默认构造器：按供应商目录创建 OpenAI 兼容客户端
#[derive(Debug, Clone, Default)]
pub struct ProviderClientFactory {
    base_url: Option<String>,
}

impl ProviderClientFactory {
    pub fn new(base_url: Option<String>) -> Self {
        Self { base_url }
    }
}

impl ClientFactory for ProviderClientFactory {
    fn create(
        &self,
        provider: Provider,
        model: &str,
        credential: &str,
    ) -> Result<Arc<dyn LlmClient>, AgentError> {
        let client = create_provider_client(provider, model, credential, self.base_url.as_deref())?;
        Ok(Arc::new(client))
    }
}

/// 显式的键控注册表
pub struct AgentCache {
    factory: Arc<dyn ClientFactory>,
    storage: StorageSection,
    history_turns: usize,
    agents: Mutex<HashMap<AgentKey, Arc<Agent>>>,
}

impl AgentCache {
    pub fn new(factory: Arc<dyn ClientFactory>, storage: StorageSection, history_turns: usize) -> Self {
        Self {
            factory,
            storage,
            history_turns,
            agents: Mutex::new(HashMap::new()),
        }
    }

    // 构建过程不会 panic，中毒的锁里数据仍然一致
    fn lock(&self) -> MutexGuard<'_, HashMap<AgentKey, Arc<Agent>>> {
        self.agents.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 取得（必要时构建）Agent；同键只构建一次，构建期间持锁
    pub fn get_agent(&self, key: &AgentKey) -> Result<Arc<Agent>, AgentError> {
        let mut agents = self.lock();
        if let Some(agent) = agents.get(key) {
            return Ok(agent.clone());
        }

        if key.credential.trim().is_empty() {
            return Err(AgentError::MissingCredential(key.provider));
        }
        if !key.provider.supports(&key.model) {
            return Err(AgentError::UnsupportedModel {
                provider: key.provider,
                model: key.model.clone(),
            });
        }

        let llm = self.factory.create(key.provider, &key.model, &key.credential)?;
        let storage = self.storage.for_role(key.role);
        let store = AgentStore::open(&storage.path, &storage.table)?;
        let agent = Arc::new(Agent::new(key.role, llm, store, self.history_turns));

        tracing::info!(
            role = %key.role,
            provider = %key.provider,
            model = %key.model,
            table = %storage.table,
            "Agent created"
        );
        agents.insert(key.clone(), agent.clone());
        Ok(agent)
    }

    /// 清空缓存，返回被丢弃的 Agent 数量
    pub fn reset(&self) -> usize {
        let mut agents = self.lock();
        let n = agents.len();
        agents.clear();
        tracing::info!("Agent cache reset ({} agents dropped)", n);
        n
    }

    /// 丢弃某个会话独占的 Agent，返回丢弃数量；共享的 Agent 不受影响
    pub fn evict_scope(&self, scope: &str) -> usize {
        let mut agents = self.lock();
        let before = agents.len();
        agents.retain(|key, _| key.scope.as_deref() != Some(scope));
        let n = before - agents.len();
        tracing::debug!(scope, "Evicted {} scoped agents", n);
        n
    }

    pub fn contains(&self, key: &AgentKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
