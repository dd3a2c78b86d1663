//! LaTeX 定界符规范化
//!
//! 分三遍处理：
//! 1. 保护：扫描代码块（```...```）与行内代码（`...`），整体替换为占位单元
//! 2. 改写：`\[ ... \]` → `$$ ... $$`，随后 `\( ... \)` → `$ ... $`（均可跨行，取最近的闭合符）
//! 3. 还原：占位单元原样放回
//!
//! 占位单元是独立的 token 而不是文本，输入中出现任何字符序列都不会与之冲突。

const FENCE: &str = "```";

/// 第一遍的产物：普通字符或受保护片段的引用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Char(char),
    Verbatim(usize),
}

#[derive(Debug, Default)]
struct Protected {
    units: Vec<Unit>,
    verbatim: Vec<String>,
}

impl Protected {
    fn push_verbatim(&mut self, span: &str) {
        self.units.push(Unit::Verbatim(self.verbatim.len()));
        self.verbatim.push(span.to_string());
    }

    fn push_str(&mut self, s: &str) {
        self.units.extend(s.chars().map(Unit::Char));
    }
}

/// 第一遍：提取代码块与行内代码
///
/// 代码块以 ``` 开始、到下一个 ``` 结束；未闭合时保护到文本末尾。
/// 行内代码为一对反引号包住的非空、不含反引号的内容；未闭合的反引号按普通字符处理。
fn protect(text: &str) -> Protected {
    let mut out = Protected::default();
    let mut rest = text;

    while let Some(pos) = rest.find('`') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with(FENCE) {
            let body = &tail[FENCE.len()..];
            let end = body
                .find(FENCE)
                .map(|i| FENCE.len() + i + FENCE.len())
                .unwrap_or(tail.len());
            out.push_verbatim(&tail[..end]);
            rest = &tail[end..];
            continue;
        }

        let body = &tail[1..];
        match body.find('`') {
            Some(close) if close > 0 => {
                let end = 1 + close + 1;
                out.push_verbatim(&tail[..end]);
                rest = &tail[end..];
            }
            _ => {
                out.push_str("`");
                rest = body;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_pair(units: &[Unit], i: usize, a: char, b: char) -> bool {
    matches!(
        (units.get(i), units.get(i + 1)),
        (Some(Unit::Char(x)), Some(Unit::Char(y))) if *x == a && *y == b
    )
}

/// 第二遍（单种定界符）：把 `\<open> ... \<close>` 改写为 `<dollars> ... <dollars>`
///
/// 从左到右取最近的闭合符；找不到闭合符的开启符保持原样。
fn rewrite_delimiters(units: &[Unit], open: char, close: char, dollars: &str) -> Vec<Unit> {
    let mut out = Vec::with_capacity(units.len());
    let mut i = 0;
    while i < units.len() {
        if is_pair(units, i, '\\', open) {
            let inner_start = i + 2;
            let closing = (inner_start..units.len()).find(|&j| is_pair(units, j, '\\', close));
            if let Some(j) = closing {
                out.extend(dollars.chars().map(Unit::Char));
                out.extend_from_slice(&units[inner_start..j]);
                out.extend(dollars.chars().map(Unit::Char));
                i = j + 2;
                continue;
            }
        }
        out.push(units[i]);
        i += 1;
    }
    out
}

/// 第三遍：还原
fn restore(units: &[Unit], verbatim: &[String]) -> String {
    let mut out = String::with_capacity(units.len());
    for unit in units {
        match unit {
            Unit::Char(c) => out.push(*c),
            Unit::Verbatim(idx) => out.push_str(&verbatim[*idx]),
        }
    }
    out
}

/// 规范化数学定界符：`\[..\]` → `$$..$$`，`\(..\)` → `$..$`；代码块与行内代码内的内容不改写
pub fn normalize_math(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let protected = protect(text);
    let display = rewrite_delimiters(&protected.units, '[', ']', "$$");
    let inline = rewrite_delimiters(&display, '(', ')', "$");
    restore(&inline, &protected.verbatim)
}
