//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PARAMODUS__*` 覆盖（双下划线表示嵌套，如 `PARAMODUS__LLM__PROVIDER=groq`）。
//! 供应商凭据单独从 `PERPLEXITY_API_KEY` / `GROQ_API_KEY` / `OPENAI_API_KEY` 读取。
//! 各角色数据库路径还可由 `AGENT_STORAGE_PATH` / `TASK_STORAGE_PATH` / `PERSONALITY_STORAGE_PATH` 覆盖。

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use crate::agent::AgentRole;
use crate::core::AgentError;
use crate::llm::Provider;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agents: AgentsSection,
    pub analysis: AnalysisSection,
    pub storage: StorageSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：供应商与模型选择；均未设置时取第一个有凭据的供应商及其默认模型
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    pub provider: Option<String>,
    pub model: Option<String>,
    /// 覆盖供应商默认端点（自建代理等）
    pub base_url: Option<String>,
}

/// [agents] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AgentsSection {
    /// 每次调用回放的本会话历史轮数（每轮 = 提示 + 回复）
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    /// 为 true 时 AgentKey 携带会话 id，每个会话独占一组 Agent
    #[serde(default)]
    pub session_scoped: bool,
}

fn default_history_turns() -> usize {
    10
}

impl Default for AgentsSection {
    fn default() -> Self {
        Self {
            history_turns: default_history_turns(),
            session_scoped: false,
        }
    }
}

/// [analysis] 段：辅助分析是每回合自动执行还是仅按需执行
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisSection {
    #[serde(default = "default_auto_extract_tasks")]
    pub auto_extract_tasks: bool,
    #[serde(default)]
    pub auto_personality: bool,
}

fn default_auto_extract_tasks() -> bool {
    true
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            auto_extract_tasks: default_auto_extract_tasks(),
            auto_personality: false,
        }
    }
}

/// 单个角色的存储位置：数据库文件 + 表名（命名空间）
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RoleStorage {
    pub path: PathBuf,
    pub table: String,
}

impl RoleStorage {
    fn new(path: &str, table: &str) -> Self {
        Self {
            path: PathBuf::from(path),
            table: table.to_string(),
        }
    }
}

/// [storage] 段：每个角色一个独立命名空间
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_main_storage")]
    pub main: RoleStorage,
    #[serde(default = "default_task_storage")]
    pub task: RoleStorage,
    #[serde(default = "default_personality_storage")]
    pub personality: RoleStorage,
}

fn default_main_storage() -> RoleStorage {
    RoleStorage::new("business_agent.db", "client_sessions")
}

fn default_task_storage() -> RoleStorage {
    RoleStorage::new("task_data.db", "task_sessions")
}

fn default_personality_storage() -> RoleStorage {
    RoleStorage::new("personality_data.db", "personality_sessions")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            main: default_main_storage(),
            task: default_task_storage(),
            personality: default_personality_storage(),
        }
    }
}

impl StorageSection {
    pub fn for_role(&self, role: AgentRole) -> &RoleStorage {
        match role {
            AgentRole::Main => &self.main,
            AgentRole::Task => &self.task,
            AgentRole::Personality => &self.personality,
        }
    }

    /// 角色数据库路径的覆盖变量名
    pub fn path_env(role: AgentRole) -> &'static str {
        match role {
            AgentRole::Main => "AGENT_STORAGE_PATH",
            AgentRole::Task => "TASK_STORAGE_PATH",
            AgentRole::Personality => "PERSONALITY_STORAGE_PATH",
        }
    }

    /// 用查找函数（按变量名）覆盖各角色的数据库路径；空值忽略
    pub fn with_path_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for role in AgentRole::ALL {
            if let Some(path) = lookup(Self::path_env(role)) {
                let path = path.trim();
                if !path.is_empty() {
                    self.for_role_mut(role).path = PathBuf::from(path);
                }
            }
        }
        self
    }

    fn for_role_mut(&mut self, role: AgentRole) -> &mut RoleStorage {
        match role {
            AgentRole::Main => &mut self.main,
            AgentRole::Task => &mut self.task,
            AgentRole::Personality => &mut self.personality,
        }
    }

    /// 把所有相对路径放到 dir 下（测试与自定义数据目录用）
    pub fn rooted_at(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        for slot in [&mut self.main, &mut self.task, &mut self.personality] {
            if slot.path.is_relative() {
                slot.path = dir.join(&slot.path);
            }
        }
        self
    }
}

/// 从 config 目录加载配置，环境变量 PARAMODUS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 PARAMODUS__*（双下划线表示嵌套键）
/// 4. 最后用 AGENT_STORAGE_PATH 等变量覆盖各角色的数据库路径
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PARAMODUS")
            .separator("__")
            .try_parsing(true),
    );

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.storage = cfg.storage.with_path_overrides(|name| std::env::var(name).ok());
    Ok(cfg)
}

/// 各供应商的凭据；空字符串视为未设置
#[derive(Clone, Default)]
pub struct Credentials {
    keys: HashMap<Provider, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从进程环境变量读取
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 用任意查找函数读取（按变量名）
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Provider::ALL
            .into_iter()
            .fold(Self::new(), |creds, p| match lookup(p.credential_env()) {
                Some(key) => creds.with(p, key),
                None => creds,
            })
    }

    pub fn with(mut self, provider: Provider, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.trim().is_empty() {
            self.keys.insert(provider, key.trim().to_string());
        }
        self
    }

    pub fn get(&self, provider: Provider) -> Option<&str> {
        self.keys.get(&provider).map(String::as_str)
    }

    /// 有凭据的供应商，按 Perplexity、Groq、OpenAI 顺序
    pub fn available(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.keys.contains_key(p))
            .collect()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("available", &self.available())
            .finish()
    }
}

/// 一次完整的模型选择：供应商、模型、凭据
#[derive(Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub provider: Provider,
    pub model: String,
    pub credential: String,
}

impl fmt::Debug for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSelection")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// 由配置与凭据得出模型选择；在任何回合开始前调用，失败即为配置错误
pub fn resolve_selection(cfg: &AppConfig, creds: &Credentials) -> Result<ModelSelection, AgentError> {
    let available = creds.available();
    if available.is_empty() {
        return Err(AgentError::Configuration(format!(
            "no API key found; set one of {}",
            Provider::ALL
                .iter()
                .map(|p| p.credential_env())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    let provider = match cfg.llm.provider.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.parse::<Provider>()?,
        _ => available[0],
    };

    let credential = creds
        .get(provider)
        .ok_or(AgentError::MissingCredential(provider))?
        .to_string();

    let model = match cfg.llm.model.as_deref().map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => provider.default_model().to_string(),
    };
    if !provider.supports(&model) {
        return Err(AgentError::UnsupportedModel { provider, model });
    }

    Ok(ModelSelection {
        provider,
        model,
        credential,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(pairs: &[(&str, &str)]) -> Credentials {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Credentials::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert!(cfg.analysis.auto_extract_tasks);
        assert!(!cfg.analysis.auto_personality);
        assert_eq!(cfg.agents.history_turns, 10);
        assert!(!cfg.agents.session_scoped);
        assert_eq!(cfg.storage.main.table, "client_sessions");
        assert_eq!(cfg.storage.task.path, PathBuf::from("task_data.db"));
        assert_eq!(cfg.storage.for_role(AgentRole::Personality).table, "personality_sessions");
    }

    #[test]
    fn test_storage_rooted_at() {
        let storage = StorageSection::default().rooted_at("/tmp/data");
        assert_eq!(storage.main.path, PathBuf::from("/tmp/data/business_agent.db"));
    }

    #[test]
    fn test_storage_path_overrides() {
        let vars: HashMap<&str, &str> = [
            ("AGENT_STORAGE_PATH", "/data/business_agent.db"),
            ("TASK_STORAGE_PATH", "  "),
            ("PERSONALITY_STORAGE_PATH", "p.db"),
        ]
        .into_iter()
        .collect();
        let storage = StorageSection::default()
            .with_path_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(storage.main.path, PathBuf::from("/data/business_agent.db"));
        assert_eq!(storage.task.path, PathBuf::from("task_data.db"));
        assert_eq!(storage.personality.path, PathBuf::from("p.db"));
        assert_eq!(storage.main.table, "client_sessions");
    }

    #[test]
    fn test_available_order_and_blank_keys() {
        let c = creds(&[("OPENAI_API_KEY", "sk"), ("GROQ_API_KEY", "gsk"), ("PERPLEXITY_API_KEY", " ")]);
        assert_eq!(c.available(), vec![Provider::Groq, Provider::OpenAi]);
        assert!(!format!("{:?}", c).contains("gsk"));
    }

    #[test]
    fn test_resolve_no_credentials() {
        let err = resolve_selection(&AppConfig::default(), &Credentials::new()).unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }

    #[test]
    fn test_resolve_defaults_to_first_available() {
        let c = creds(&[("OPENAI_API_KEY", "sk-1"), ("GROQ_API_KEY", "gsk-1")]);
        let sel = resolve_selection(&AppConfig::default(), &c).unwrap();
        assert_eq!(sel.provider, Provider::Groq);
        assert_eq!(sel.model, "llama-3.3-70b-versatile");
        assert_eq!(sel.credential, "gsk-1");
        assert!(!format!("{:?}", sel).contains("gsk-1"));
    }

    #[test]
    fn test_resolve_explicit_provider_without_key() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = Some("perplexity".into());
        let c = creds(&[("OPENAI_API_KEY", "sk-1")]);
        let err = resolve_selection(&cfg, &c).unwrap_err();
        assert!(matches!(err, AgentError::MissingCredential(Provider::Perplexity)));
    }

    #[test]
    fn test_resolve_unsupported_model() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = Some("OpenAI".into());
        cfg.llm.model = Some("sonar".into());
        let c = creds(&[("OPENAI_API_KEY", "sk-1")]);
        let err = resolve_selection(&cfg, &c).unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedModel { .. }));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("paramodus.toml");
        std::fs::write(
            &path,
            "[llm]\nprovider = \"groq\"\nmodel = \"llama3-8b-8192\"\n\n[analysis]\nauto_personality = true\n\n[storage.task]\npath = \"t.db\"\ntable = \"tasks_ns\"\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.provider.as_deref(), Some("groq"));
        assert!(cfg.analysis.auto_personality);
        assert!(cfg.analysis.auto_extract_tasks);
        assert_eq!(cfg.storage.task.table, "tasks_ns");
        assert_eq!(cfg.storage.main.table, "client_sessions");
    }
}
