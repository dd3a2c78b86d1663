//! 编排器：一个用户回合的执行顺序
//!
//! 1. 在任何模型调用前解析主 Agent（配置错误在此暴露，会话不被修改）
//! 2. 追加用户消息（只存原始提示）
//! 3. 主 Agent 以「文档上下文 + 提示」调用，存储中只记原始提示；失败时追加固定的兜底回复并把错误交给调用方
//! 4. 主回复落定后，按配置依次执行任务提取 / 性格分析；辅助 Agent 的构建与调用失败都只体现在各自的 Analysis 中
//!
//! 所有调用严格串行，不做超时、重试或取消。

use std::sync::Arc;

use crate::agent::{Agent, AgentCache, AgentKey, AgentRole, ProviderClientFactory};
use crate::config::{resolve_selection, AppConfig, Credentials, ModelSelection};
use crate::core::{AgentError, SessionState};
use crate::memory::Message;
use crate::tasks::{parse, Task};

/// 主 Agent 失败时追加的回复
pub const FALLBACK_REPLY: &str = "Sorry, I encountered an error processing your request.";

/// 辅助分析的结果；与主回合的 Result 分开，失败无法用 `?` 传播到主路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Analysis<T> {
    Completed(T),
    /// 失败说明，可作为非致命提示展示
    Failed(String),
}

impl<T> Analysis<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Analysis::Completed(_))
    }

    pub fn completed(&self) -> Option<&T> {
        match self {
            Analysis::Completed(v) => Some(v),
            Analysis::Failed(_) => None,
        }
    }

    pub fn notice(&self) -> Option<&str> {
        match self {
            Analysis::Completed(_) => None,
            Analysis::Failed(msg) => Some(msg),
        }
    }
}

/// 一次任务提取的产出：模型原始输出 + 实际新增的任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskExtraction {
    /// 任务 Agent 的原始回复，可直接展示
    pub raw: String,
    pub added: Vec<Task>,
}

/// 一个回合的产出
#[derive(Debug)]
pub struct TurnReport {
    /// 已追加到会话的助手消息（成功回复或兜底回复）
    pub reply: Message,
    /// 主 Agent 调用失败时的错误，供展示
    pub error: Option<AgentError>,
    /// 本回合自动执行的任务提取；未开启时为 None
    pub tasks: Option<Analysis<TaskExtraction>>,
    /// 本回合自动执行的性格分析；未开启时为 None
    pub personality: Option<Analysis<String>>,
}

/// 回合行为开关
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnOptions {
    pub auto_extract_tasks: bool,
    pub auto_personality: bool,
    /// AgentKey 是否带会话 id
    pub session_scoped: bool,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            auto_extract_tasks: true,
            auto_personality: false,
            session_scoped: false,
        }
    }
}

impl From<&AppConfig> for TurnOptions {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            auto_extract_tasks: cfg.analysis.auto_extract_tasks,
            auto_personality: cfg.analysis.auto_personality,
            session_scoped: cfg.agents.session_scoped,
        }
    }
}

fn task_prompt(prompt: &str) -> String {
    format!("Extract tasks from this conversation: User said: '{}'", prompt)
}

fn personality_prompt(prompt: &str) -> String {
    format!("Analyze this conversation: User said: '{}'", prompt)
}

pub struct Orchestrator {
    cache: Arc<AgentCache>,
    selection: ModelSelection,
    options: TurnOptions,
}

impl Orchestrator {
    pub fn new(cache: Arc<AgentCache>, selection: ModelSelection, options: TurnOptions) -> Self {
        Self {
            cache,
            selection,
            options,
        }
    }

    /// 从配置与凭据构建：解析模型选择、创建默认客户端构造器与缓存
    pub fn from_config(cfg: &AppConfig, creds: &Credentials) -> Result<Self, AgentError> {
        let selection = resolve_selection(cfg, creds)?;
        let factory = Arc::new(ProviderClientFactory::new(cfg.llm.base_url.clone()));
        let cache = Arc::new(AgentCache::new(
            factory,
            cfg.storage.clone(),
            cfg.agents.history_turns,
        ));
        Ok(Self::new(cache, selection, TurnOptions::from(cfg)))
    }

    pub fn selection(&self) -> &ModelSelection {
        &self.selection
    }

    pub fn options(&self) -> TurnOptions {
        self.options
    }

    pub fn cache(&self) -> &Arc<AgentCache> {
        &self.cache
    }

    /// 本会话某角色的缓存键
    pub fn key_for(&self, state: &SessionState, role: AgentRole) -> AgentKey {
        let key = AgentKey::new(&self.selection, role);
        if self.options.session_scoped {
            key.scoped(state.id())
        } else {
            key
        }
    }

    fn agent(&self, state: &SessionState, role: AgentRole) -> Result<Arc<Agent>, AgentError> {
        self.cache.get_agent(&self.key_for(state, role))
    }

    /// 执行一个回合；只有主 Agent 的构建错误返回 Err（此时会话未被修改）
    pub async fn handle_turn(
        &self,
        state: &mut SessionState,
        prompt: &str,
    ) -> Result<TurnReport, AgentError> {
        let main = self.agent(state, AgentRole::Main)?;

        state.push_user(prompt);
        tracing::info!(session = %state.id(), "Turn started");

        let effective = state.effective_prompt(prompt);
        let (reply, error) = match main.run_as(state.id(), &effective, prompt).await {
            Ok(content) => (Message::assistant(content), None),
            Err(e) => {
                tracing::warn!(session = %state.id(), "Main agent failed: {}", e);
                (Message::assistant(FALLBACK_REPLY), Some(AgentError::ProviderCall(e)))
            }
        };
        state.push_assistant(reply.clone());

        let tasks = if self.options.auto_extract_tasks {
            Some(self.extract_tasks(state, prompt).await)
        } else {
            None
        };
        let personality = if self.options.auto_personality {
            Some(self.analyze_personality(state, prompt).await)
        } else {
            None
        };

        tracing::info!(
            session = %state.id(),
            ok = error.is_none(),
            messages = state.messages().len(),
            "Turn finished"
        );
        Ok(TurnReport {
            reply,
            error,
            tasks,
            personality,
        })
    }

    /// 任务提取：结果合并进会话任务列表，返回原始输出与新增的任务
    pub async fn extract_tasks(&self, state: &mut SessionState, prompt: &str) -> Analysis<TaskExtraction> {
        let result = match self.agent(state, AgentRole::Task) {
            Ok(agent) => agent.run(state.id(), &task_prompt(prompt)).await.map_err(AgentError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(raw) => {
                let added = state.merge_tasks(parse(&raw));
                tracing::debug!(session = %state.id(), added = added.len(), "Tasks extracted");
                Analysis::Completed(TaskExtraction { raw, added })
            }
            Err(e) => {
                tracing::warn!(session = %state.id(), "Task extraction failed: {}", e);
                Analysis::Failed(format!("Error in task extraction: {}", e))
            }
        }
    }

    /// 性格分析
    pub async fn analyze_personality(&self, state: &SessionState, prompt: &str) -> Analysis<String> {
        let result = match self.agent(state, AgentRole::Personality) {
            Ok(agent) => agent
                .run(state.id(), &personality_prompt(prompt))
                .await
                .map_err(AgentError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(content) => Analysis::Completed(content),
            Err(e) => {
                tracing::warn!(session = %state.id(), "Personality analysis failed: {}", e);
                Analysis::Failed(format!("Error in personality analysis: {}", e))
            }
        }
    }

    /// 新对话：换成全新的会话（新 id、空记录、无文档上下文）
    ///
    /// 会话独占 Agent 时只丢弃旧会话的那组 Agent，否则清空整个缓存
    pub fn new_conversation(&self, state: &mut SessionState) {
        if self.options.session_scoped {
            self.cache.evict_scope(state.id());
        } else {
            self.cache.reset();
        }
        *state = SessionState::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ClientFactory;
    use crate::config::StorageSection;
    use crate::llm::{LlmClient, LlmError, MockLlmClient, Provider};
    use crate::memory::Role;
    use tempfile::TempDir;

    /// 按角色指令把调用分派到不同的 Mock（三种角色共用一个客户端构造器）
    struct RoleRouter {
        main: Arc<MockLlmClient>,
        task: Arc<MockLlmClient>,
        personality: Arc<MockLlmClient>,
    }

    #[async_trait::async_trait]
    impl LlmClient for RoleRouter {
        async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
            let system = &messages[0].content;
            let target = if system.starts_with("Extract actionable tasks") {
                &self.task
            } else if system.starts_with("Summarize the conversation") {
                &self.personality
            } else {
                &self.main
            };
            target.complete(messages).await
        }
    }

    struct RouterFactory(Arc<RoleRouter>);

    impl ClientFactory for RouterFactory {
        fn create(&self, _: Provider, _: &str, _: &str) -> Result<Arc<dyn LlmClient>, AgentError> {
            Ok(self.0.clone())
        }
    }

    fn selection() -> ModelSelection {
        ModelSelection {
            provider: Provider::Groq,
            model: "llama3-8b-8192".into(),
            credential: "gsk-test".into(),
        }
    }

    fn orchestrator(
        dir: &TempDir,
        main: MockLlmClient,
        task: MockLlmClient,
        personality: MockLlmClient,
        options: TurnOptions,
    ) -> (Orchestrator, Arc<RoleRouter>) {
        let storage = StorageSection::default().rooted_at(dir.path());
        orchestrator_with(storage, 0, main, task, personality, options)
    }

    fn orchestrator_with(
        storage: StorageSection,
        history_turns: usize,
        main: MockLlmClient,
        task: MockLlmClient,
        personality: MockLlmClient,
        options: TurnOptions,
    ) -> (Orchestrator, Arc<RoleRouter>) {
        let router = Arc::new(RoleRouter {
            main: Arc::new(main),
            task: Arc::new(task),
            personality: Arc::new(personality),
        });
        let cache = Arc::new(AgentCache::new(
            Arc::new(RouterFactory(router.clone())),
            storage,
            history_turns,
        ));
        (Orchestrator::new(cache, selection(), options), router)
    }

    #[tokio::test]
    async fn test_successful_turn() {
        let dir = TempDir::new().unwrap();
        let (orch, router) = orchestrator(
            &dir,
            MockLlmClient::with_replies(["The answer is \\(42\\)."]),
            MockLlmClient::with_replies(["- Review chapter three\n- ok"]),
            MockLlmClient::new(),
            TurnOptions::default(),
        );
        let mut state = SessionState::new();

        let report = orch.handle_turn(&mut state, "Help me study").await.unwrap();
        assert!(report.error.is_none());
        assert_eq!(report.reply.content, "The answer is \\(42\\).");
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.messages()[0], Message::user("Help me study"));
        assert_eq!(state.messages()[1].role, Role::Assistant);

        let extraction = report.tasks.unwrap();
        let extraction = extraction.completed().unwrap();
        assert_eq!(extraction.added.len(), 1);
        assert_eq!(extraction.raw, "- Review chapter three\n- ok");
        assert_eq!(state.tasks()[0].text(), "Review chapter three");
        assert!(report.personality.is_none());
        assert_eq!(router.personality.call_count(), 0);

        let task_call = &router.task.calls()[0];
        assert_eq!(
            task_call.last().unwrap().content,
            "Extract tasks from this conversation: User said: 'Help me study'"
        );
    }

    #[tokio::test]
    async fn test_main_failure_appends_fallback() {
        let dir = TempDir::new().unwrap();
        let (orch, _) = orchestrator(
            &dir,
            MockLlmClient::failing("401 Unauthorized"),
            MockLlmClient::with_replies(["- Renew the API key"]),
            MockLlmClient::new(),
            TurnOptions::default(),
        );
        let mut state = SessionState::new();

        let report = orch.handle_turn(&mut state, "hello").await.unwrap();
        assert_eq!(report.reply.content, FALLBACK_REPLY);
        assert!(matches!(report.error, Some(AgentError::ProviderCall(_))));
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.messages()[1], Message::assistant(FALLBACK_REPLY));
        // 主回复失败后任务提取照常执行
        assert_eq!(state.tasks().len(), 1);
    }

    #[tokio::test]
    async fn test_task_failure_is_local() {
        let dir = TempDir::new().unwrap();
        let (orch, _) = orchestrator(
            &dir,
            MockLlmClient::with_replies(["Sure."]),
            MockLlmClient::failing("rate limited"),
            MockLlmClient::failing("rate limited"),
            TurnOptions {
                auto_personality: true,
                ..TurnOptions::default()
            },
        );
        let mut state = SessionState::new();

        let report = orch.handle_turn(&mut state, "plan my week").await.unwrap();
        assert!(report.error.is_none());
        assert_eq!(report.reply.content, "Sure.");
        assert!(report.tasks.as_ref().unwrap().notice().unwrap().contains("rate limited"));
        assert!(!report.personality.as_ref().unwrap().is_completed());
        assert_eq!(state.messages().len(), 2);
        assert!(state.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_document_context_not_stored() {
        let dir = TempDir::new().unwrap();
        let (orch, router) = orchestrator(
            &dir,
            MockLlmClient::new(),
            MockLlmClient::new(),
            MockLlmClient::new(),
            TurnOptions {
                auto_extract_tasks: false,
                ..TurnOptions::default()
            },
        );
        let mut state = SessionState::new();
        state.set_document_context("Newton's laws");

        let report = orch.handle_turn(&mut state, "explain").await.unwrap();
        assert!(report.tasks.is_none());
        assert_eq!(state.messages()[0].content, "explain");
        let sent = &router.main.calls()[0];
        assert_eq!(
            sent.last().unwrap().content,
            "Context from document:\nNewton's laws\n\nUser: explain"
        );
        assert_eq!(router.task.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unopenable_auxiliary_storage_keeps_chat_working() {
        let dir = TempDir::new().unwrap();
        let mut storage = StorageSection::default().rooted_at(dir.path());
        // 目录无法作为数据库文件打开
        let task_dir = dir.path().join("taskdir");
        std::fs::create_dir(&task_dir).unwrap();
        storage.task.path = task_dir;
        storage.personality.table = "bad-table".into();
        let (orch, router) = orchestrator_with(
            storage,
            0,
            MockLlmClient::with_replies(["Hello there."]),
            MockLlmClient::new(),
            MockLlmClient::new(),
            TurnOptions {
                auto_personality: true,
                ..TurnOptions::default()
            },
        );
        let mut state = SessionState::new();

        let report = orch.handle_turn(&mut state, "hello").await.unwrap();
        assert!(report.error.is_none());
        assert_eq!(report.reply.content, "Hello there.");
        assert_eq!(state.messages().len(), 2);
        assert!(report.tasks.unwrap().notice().unwrap().starts_with("Error in task extraction"));
        assert!(report.personality.unwrap().notice().unwrap().starts_with("Error in personality analysis"));
        assert_eq!(router.task.call_count(), 0);
        assert!(state.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_document_context_not_replayed() {
        let dir = TempDir::new().unwrap();
        let (orch, router) = orchestrator_with(
            StorageSection::default().rooted_at(dir.path()),
            10,
            MockLlmClient::with_replies(["first", "second", "third"]),
            MockLlmClient::new(),
            MockLlmClient::new(),
            TurnOptions {
                auto_extract_tasks: false,
                ..TurnOptions::default()
            },
        );
        let mut state = SessionState::new();
        state.set_document_context("Maxwell's equations");

        for prompt in ["one", "two", "three"] {
            orch.handle_turn(&mut state, prompt).await.unwrap();
        }

        let main = orch.agent(&state, AgentRole::Main).unwrap();
        let stored = main.store().history(state.id(), None).unwrap();
        assert_eq!(stored.len(), 6);
        assert!(stored.iter().all(|m| !m.content.contains("Context from document:")));
        assert_eq!(stored[0], Message::user("one"));

        let third = &router.main.calls()[2];
        let copies = third.iter().filter(|m| m.content.contains("Maxwell's equations")).count();
        assert_eq!(copies, 1);
    }

    #[tokio::test]
    async fn test_configuration_error_leaves_state_untouched() {
        let dir = TempDir::new().unwrap();
        let (orch, _) = orchestrator(
            &dir,
            MockLlmClient::new(),
            MockLlmClient::new(),
            MockLlmClient::new(),
            TurnOptions::default(),
        );
        let orch = Orchestrator::new(
            orch.cache().clone(),
            ModelSelection {
                model: "gpt-4o".into(),
                ..selection()
            },
            TurnOptions::default(),
        );
        let mut state = SessionState::new();

        let err = orch.handle_turn(&mut state, "hi").await.unwrap_err();
        assert!(err.is_configuration());
        assert!(state.messages().is_empty());
    }

    #[tokio::test]
    async fn test_on_demand_personality() {
        let dir = TempDir::new().unwrap();
        let (orch, router) = orchestrator(
            &dir,
            MockLlmClient::new(),
            MockLlmClient::new(),
            MockLlmClient::with_replies(["Curious and methodical."]),
            TurnOptions::default(),
        );
        let state = SessionState::new();

        let analysis = orch.analyze_personality(&state, "I love proofs").await;
        assert_eq!(analysis, Analysis::Completed("Curious and methodical.".to_string()));
        assert_eq!(
            router.personality.calls()[0].last().unwrap().content,
            "Analyze this conversation: User said: 'I love proofs'"
        );
        assert!(state.messages().is_empty());
    }

    #[tokio::test]
    async fn test_on_demand_extract_dedups() {
        let dir = TempDir::new().unwrap();
        let (orch, _) = orchestrator(
            &dir,
            MockLlmClient::new(),
            MockLlmClient::with_replies(["- Buy milk", "- BUY MILK\n- Call mom today"]),
            MockLlmClient::new(),
            TurnOptions::default(),
        );
        let mut state = SessionState::new();

        assert_eq!(orch.extract_tasks(&mut state, "x").await.completed().unwrap().added.len(), 1);
        let second = orch.extract_tasks(&mut state, "y").await;
        assert_eq!(second.completed().unwrap().added[0].text(), "Call mom today");
        assert_eq!(state.tasks().len(), 2);
    }

    #[tokio::test]
    async fn test_session_scoped_keys() {
        let dir = TempDir::new().unwrap();
        let (orch, _) = orchestrator(
            &dir,
            MockLlmClient::new(),
            MockLlmClient::new(),
            MockLlmClient::new(),
            TurnOptions {
                session_scoped: true,
                auto_extract_tasks: false,
                ..TurnOptions::default()
            },
        );
        let mut a = SessionState::new();
        let mut b = SessionState::new();
        orch.handle_turn(&mut a, "one").await.unwrap();
        orch.handle_turn(&mut b, "two").await.unwrap();
        assert_eq!(orch.cache().len(), 2);
        assert_eq!(orch.key_for(&a, AgentRole::Main).scope.as_deref(), Some(a.id()));
    }

    #[tokio::test]
    async fn test_new_conversation_evicts_only_own_scope() {
        let dir = TempDir::new().unwrap();
        let (orch, _) = orchestrator(
            &dir,
            MockLlmClient::new(),
            MockLlmClient::new(),
            MockLlmClient::new(),
            TurnOptions {
                session_scoped: true,
                ..TurnOptions::default()
            },
        );
        let mut a = SessionState::new();
        let mut b = SessionState::new();
        orch.handle_turn(&mut a, "one").await.unwrap();
        orch.handle_turn(&mut b, "two").await.unwrap();
        assert_eq!(orch.cache().len(), 4);

        orch.new_conversation(&mut a);
        assert_eq!(orch.cache().len(), 2);
        assert!(orch.cache().contains(&orch.key_for(&b, AgentRole::Main)));
        assert!(a.messages().is_empty());
    }

    #[tokio::test]
    async fn test_new_conversation_resets() {
        let dir = TempDir::new().unwrap();
        let (orch, _) = orchestrator(
            &dir,
            MockLlmClient::new(),
            MockLlmClient::new(),
            MockLlmClient::new(),
            TurnOptions::default(),
        );
        let mut state = SessionState::new();
        state.set_document_context("notes");
        orch.handle_turn(&mut state, "hi").await.unwrap();
        let old_id = state.id().to_string();
        assert!(!orch.cache().is_empty());

        orch.new_conversation(&mut state);
        assert_ne!(state.id(), old_id);
        assert!(state.messages().is_empty());
        assert!(state.tasks().is_empty());
        assert!(state.document_context().is_none());
        assert!(orch.cache().is_empty());
    }
}
