//! 混合内容切分：把规范化后的文本按数学片段切成 prose / math 段，供差异化渲染
//!
//! 切分保留定界片段本身（`$$...$$` 优先于 `$...$`，均取最近闭合，可跨行），
//! 因此 split_math 的结果首尾相接即为输入原文。

use serde::{Deserialize, Serialize};

use super::latex::normalize_math;

/// 片段类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Prose,
    Math,
}

/// 一段可渲染内容
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub value: String,
}

impl Segment {
    pub fn is_math(&self) -> bool {
        self.kind == SegmentKind::Math
    }

    /// 去掉外层 `$$` 或 `$` 后的表达式；prose 段原样返回
    pub fn math_body(&self) -> &str {
        match self.kind {
            SegmentKind::Prose => &self.value,
            SegmentKind::Math => {
                let v = self.value.as_str();
                let body = if is_display_span(v) {
                    v.get(2..v.len().saturating_sub(2))
                } else {
                    v.get(1..v.len().saturating_sub(1))
                };
                body.unwrap_or("")
            }
        }
    }
}

fn is_display_span(piece: &str) -> bool {
    piece.starts_with("$$") && piece.ends_with("$$")
}

fn is_inline_span(piece: &str) -> bool {
    piece.len() >= 2 && piece.starts_with('$') && piece.ends_with('$') && !piece.starts_with("$$")
}

/// 片段分类：先判断 `$$...$$`，再判断 `$...$`
pub fn classify(piece: &str) -> SegmentKind {
    if is_display_span(piece) || is_inline_span(piece) {
        SegmentKind::Math
    } else {
        SegmentKind::Prose
    }
}

/// 在 start（指向 '$'）处尝试匹配一个数学片段，返回片段结束位置（不含）
fn match_span(text: &str, start: usize) -> Option<usize> {
    let after = &text[start + 1..];
    if after.starts_with('$') {
        if let Some(close) = text[start + 2..].find("$$") {
            return Some(start + 2 + close + 2);
        }
    }
    after.find('$').map(|close| start + 1 + close + 1)
}

/// 按数学片段切分，保留定界片段；包含空白片段，拼接后等于输入
pub fn split_math(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut cursor = 0;
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('$') {
        let start = search_from + offset;
        match match_span(text, start) {
            Some(end) => {
                if start > cursor {
                    pieces.push(&text[cursor..start]);
                }
                pieces.push(&text[start..end]);
                cursor = end;
                search_from = end;
            }
            // 后面再无 '$'，不会有更多匹配
            None => break,
        }
    }
    if cursor < text.len() {
        pieces.push(&text[cursor..]);
    }
    pieces
}

/// 规范化后切分为有序片段，丢弃空白片段
pub fn segment(text: &str) -> Vec<Segment> {
    let normalized = normalize_math(text);
    split_math(&normalized)
        .into_iter()
        .filter(|piece| !piece.trim().is_empty())
        .map(|piece| Segment {
            kind: classify(piece),
            value: piece.to_string(),
        })
        .collect()
}

/// 规范化后的文本是否含数学：出现 `$$`，或 `$` 出现偶数次（且至少一次）
pub fn contains_math(text: &str) -> bool {
    let normalized = normalize_math(text);
    let dollars = normalized.matches('$').count();
    normalized.contains("$$") || (dollars > 0 && dollars % 2 == 0)
}
