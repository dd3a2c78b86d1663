//! Agent 持久化
//!
//! 每个角色一个 SQLite 表（命名空间），按 session_id 存放该角色收到的提示与回复，
//! 同一角色的 Agent 跨进程重启共享历史；不同命名空间之间互不读取。

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::memory::{Message, Role};

/// 持久化错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// 表名只允许字母、数字、下划线，且不能以数字开头
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// 角色命名空间下的 SQLite 存储；由缓存中的 Agent 独占持有
#[derive(Debug)]
pub struct AgentStore {
    conn: Mutex<Connection>,
    table: String,
}

impl AgentStore {
    /// 打开（或创建）数据库文件并初始化命名空间表；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, StoreError> {
        if !is_valid_table_name(table) {
            return Err(StoreError::InvalidTable(table.to_string()));
        }
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?, table)
    }

    /// 仅存在于内存的存储（测试用）
    pub fn open_in_memory(table: &str) -> Result<Self, StoreError> {
        if !is_valid_table_name(table) {
            return Err(StoreError::InvalidTable(table.to_string()));
        }
        Self::init(Connection::open_in_memory()?, table)
    }

    fn init(conn: Connection, table: &str) -> Result<Self, StoreError> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_session ON {table}(session_id);"
        ))?;
        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// 追加一条消息到会话
    pub fn append(&self, session_id: &str, message: &Message) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            &format!(
                "INSERT INTO {} (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                self.table
            ),
            params![
                session_id,
                message.role.as_str(),
                message.content,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// 读取会话历史（按写入顺序）；limit 为 Some(n) 时只取最近 n 条
    pub fn history(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(&format!(
            "SELECT role, content FROM (
                SELECT id, role, content FROM {} WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2
            ) ORDER BY id ASC",
            self.table
        ))?;
        let rows = stmt.query_map(params![session_id, limit], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let rows = rows.collect::<Result<Vec<_>, _>>()?;

        // 角色无法识别的行不回放（避免被当作 system 指令）
        let messages = rows
            .into_iter()
            .filter_map(|(role, content)| match Role::parse(&role) {
                Some(role) => Some(Message { role, content }),
                None => {
                    tracing::warn!(table = %self.table, role = %role, "Skipping row with unknown role");
                    None
                }
            })
            .collect();
        Ok(messages)
    }

    /// 删除会话的全部记录，返回删除条数
    pub fn clear_session(&self, session_id: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let n = conn.execute(
            &format!("DELETE FROM {} WHERE session_id = ?1", self.table),
            params![session_id],
        )?;
        Ok(n)
    }
}
