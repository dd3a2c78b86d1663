//! 终端渲染：数学片段与普通文本使用不同样式输出

use std::io::Write;

use crossterm::queue;
use crossterm::style::{Color, Print, PrintStyledContent, Stylize};

use super::segment::{segment, Segment};
use crate::memory::{Message, Role};

/// 逐段输出：math 段青色加粗，prose 段原样
pub fn write_segments<W: Write>(out: &mut W, segments: &[Segment]) -> std::io::Result<()> {
    for seg in segments {
        if seg.is_math() {
            queue!(out, PrintStyledContent(seg.value.as_str().with(Color::Cyan).bold()))?;
        } else {
            queue!(out, Print(&seg.value))?;
        }
    }
    queue!(out, Print("\n"))?;
    out.flush()
}

/// 带角色前缀输出一条消息
pub fn write_message<W: Write>(out: &mut W, message: &Message) -> std::io::Result<()> {
    let (prefix, color) = match message.role {
        Role::User => ("You ", Color::Cyan),
        Role::Assistant => ("Paramodus ", Color::Green),
        Role::System => ("Sys ", Color::Grey),
    };
    queue!(out, PrintStyledContent(prefix.with(color).bold()))?;
    write_segments(out, &segment(&message.content))
}
