//! Agent 角色：决定指令（persona）与持久化命名空间

use std::fmt;

/// 三种角色共用同一个模型选择，仅指令与存储命名空间不同
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    /// 主对话
    Main,
    /// 任务提取
    Task,
    /// 性格分析
    Personality,
}

const LATEX_GUIDE: &str = "When including mathematical expressions, use proper LaTeX formatting:
- Use \\( expression \\) for inline math
- Use \\[ expression \\] for display math (block equations)";

impl AgentRole {
    pub const ALL: [AgentRole; 3] = [AgentRole::Main, AgentRole::Task, AgentRole::Personality];

    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Main => "main",
            AgentRole::Task => "task",
            AgentRole::Personality => "personality",
        }
    }

    /// 系统指令；每个角色都要求使用 `\( \)` / `\[ \]`，由渲染层统一改写
    pub fn instructions(self) -> String {
        let persona = match self {
            AgentRole::Main => {
                "You are Paramodus, a helpful learning assistant.
Talk to the user naturally and helpfully.
Provide complete, well-formatted responses.
Do not mention delegation or other agents in your response."
            }
            AgentRole::Task => {
                "Extract actionable tasks. Return as list, one per line starting with '- '.
If there is nothing actionable, return no list items."
            }
            AgentRole::Personality => {
                "Summarize the conversation and give a brief personality analysis."
            }
        };
        format!("{}\n{}", persona, LATEX_GUIDE)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
