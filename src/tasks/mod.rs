//! 任务：从模型输出中提取的可执行事项与手动事项
//!
//! 任务以文本（不区分大小写）为身份，同一会话的任务列表中不允许出现两条相同文本。

pub mod extractor;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use extractor::{merge, merge_into, parse};

/// 任务来源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSource {
    Manual,
    Extracted,
}

/// 单条任务；text 始终为去除首尾空白后的非空字符串
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    text: String,
    pub completed: bool,
    pub source: TaskSource,
}

impl Task {
    /// 文本去除首尾空白后为空时返回 None
    pub fn new(text: &str, source: TaskSource) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            completed: false,
            source,
        })
    }

    pub fn manual(text: &str) -> Option<Self> {
        Self::new(text, TaskSource::Manual)
    }

    pub fn extracted(text: &str) -> Option<Self> {
        Self::new(text, TaskSource::Extracted)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// 去重用的身份键
    pub fn identity(&self) -> String {
        self.text.to_lowercase()
    }

    pub fn same_as(&self, other: &Task) -> bool {
        self.identity() == other.identity()
    }
}

/// 手动维护任务列表时的拒绝原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task text is empty")]
    Empty,

    #[error("Task already exists: {0}")]
    Duplicate(String),

    #[error("No task at index {0}")]
    NotFound(usize),
}
