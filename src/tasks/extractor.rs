//! 任务提取与去重
//!
//! parse：逐行扫描模型输出，以 "- " 或 "* " 开头的行视为任务行，去掉标记后长度不超过 3 个字符的视为噪音丢弃。
//! merge：按文本不区分大小写去重，保持已有顺序并按输入顺序追加新任务；重复合并同一输入结果不变。

use std::collections::HashSet;

use super::Task;

const TASK_MARKERS: [&str; 2] = ["- ", "* "];

/// 短于或等于此长度（字符数）的任务文本被丢弃
const MIN_TASK_CHARS: usize = 3;

/// 从模型回复中解析任务；无任务行或输入为空时返回空 Vec
pub fn parse(response_text: &str) -> Vec<Task> {
    response_text
        .split('\n')
        .filter_map(|line| {
            let line = line.trim();
            let rest = TASK_MARKERS
                .iter()
                .find_map(|marker| line.strip_prefix(marker))?;
            let text = rest.trim();
            if text.chars().count() <= MIN_TASK_CHARS {
                return None;
            }
            Task::extracted(text)
        })
        .collect()
}

/// 将 incoming 中未出现过的任务追加到 existing，返回实际追加的任务
///
/// incoming 内部的重复也只保留第一条
pub fn merge_into(existing: &mut Vec<Task>, incoming: impl IntoIterator<Item = Task>) -> Vec<Task> {
    let mut seen: HashSet<String> = existing.iter().map(Task::identity).collect();
    let mut added = Vec::new();
    for task in incoming {
        if seen.insert(task.identity()) {
            existing.push(task.clone());
            added.push(task);
        }
    }
    added
}

/// 纯函数版本：返回合并后的新列表
pub fn merge(existing: &[Task], incoming: &[Task]) -> Vec<Task> {
    let mut merged = existing.to_vec();
    merge_into(&mut merged, incoming.iter().cloned());
    merged
}
