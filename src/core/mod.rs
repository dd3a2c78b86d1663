//! 核心编排层：错误类型、会话状态、回合编排

pub mod error;
pub mod orchestrator;
pub mod session;

pub use error::AgentError;
pub use orchestrator::{Analysis, Orchestrator, TaskExtraction, TurnOptions, TurnReport, FALLBACK_REPLY};
pub use session::SessionState;
