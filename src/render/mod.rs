//! 渲染层：LaTeX 定界符规范化、prose / math 切分、终端输出

pub mod latex;
pub mod segment;
pub mod terminal;

pub use latex::normalize_math;
pub use segment::{classify, contains_math, segment, split_math, Segment, SegmentKind};
pub use terminal::{write_message, write_segments};
