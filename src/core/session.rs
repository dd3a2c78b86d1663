//! 会话状态：消息记录、任务列表、可选的文档上下文
//!
//! 由单个会话独占；消息只追加不修改，任务列表在每次修改后都保持「文本不区分大小写唯一」。

use serde::{Deserialize, Serialize};

use crate::memory::Message;
use crate::tasks::{merge_into, Task, TaskError};

const DOCUMENT_LABEL: &str = "Context from document:";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionState {
    id: String,
    messages: Vec<Message>,
    tasks: Vec<Task>,
    document_context: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            tasks: Vec::new(),
            document_context: None,
        }
    }

    /// 会话 id，用作各角色存储中的会话键
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn document_context(&self) -> Option<&str> {
        self.document_context.as_deref()
    }

    /// 设置文档上下文；空白文本视为无
    pub fn set_document_context(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.document_context = if text.trim().is_empty() { None } else { Some(text) };
    }

    pub fn clear_document_context(&mut self) {
        self.document_context = None;
    }

    /// 发给主 Agent 的实际提示：有文档上下文时加标签前置，不写回消息记录
    pub fn effective_prompt(&self, prompt: &str) -> String {
        match &self.document_context {
            Some(doc) => format!("{}\n{}\n\nUser: {}", DOCUMENT_LABEL, doc, prompt),
            None => prompt.to_string(),
        }
    }

    pub(crate) fn push_user(&mut self, content: &str) {
        self.messages.push(Message::user(content));
    }

    pub(crate) fn push_assistant(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// 合并提取到的任务，返回实际新增的任务
    pub fn merge_tasks(&mut self, incoming: Vec<Task>) -> Vec<Task> {
        merge_into(&mut self.tasks, incoming)
    }

    /// 手动添加任务（去除首尾空白，拒绝空文本与重复）
    pub fn add_manual_task(&mut self, text: &str) -> Result<&Task, TaskError> {
        let task = Task::manual(text).ok_or(TaskError::Empty)?;
        if self.tasks.iter().any(|t| t.same_as(&task)) {
            return Err(TaskError::Duplicate(task.text().to_string()));
        }
        self.tasks.push(task);
        Ok(&self.tasks[self.tasks.len() - 1])
    }

    /// 切换完成状态，返回新状态
    pub fn toggle_task(&mut self, index: usize) -> Result<bool, TaskError> {
        let task = self.tasks.get_mut(index).ok_or(TaskError::NotFound(index))?;
        task.completed = !task.completed;
        Ok(task.completed)
    }

    pub fn set_task_completed(&mut self, index: usize, completed: bool) -> Result<(), TaskError> {
        let task = self.tasks.get_mut(index).ok_or(TaskError::NotFound(index))?;
        task.completed = completed;
        Ok(())
    }

    pub fn remove_task(&mut self, index: usize) -> Result<Task, TaskError> {
        if index >= self.tasks.len() {
            return Err(TaskError::NotFound(index));
        }
        Ok(self.tasks.remove(index))
    }

    pub fn clear_tasks(&mut self) {
        self.tasks.clear();
    }

    /// 未完成任务数
    pub fn pending_tasks(&self) -> usize {
        self.tasks.iter().filter(|t| !t.completed).count()
    }
}
