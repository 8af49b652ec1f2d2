//! 字节流到帧的解析器
//!
//! UDP 数据报的切分位置与行边界无关：一个数据报可能携带多行，
//! 一行也可能横跨两个数据报。[`StreamParser`] 在 [`FrameBuilder`]
//! 之上补齐这一层：半行缓存到下一次 `feed`，解码失败的字节直接
//! 丢弃而不是中断解析。

use smallvec::SmallVec;

use crate::builder::FrameBuilder;
use crate::frame::TelemetryFrame;
use crate::{INLINE_JOINTS, JointId};

/// 跨数据报的流式解析器
///
/// # 示例
///
/// ```rust
/// use ugo_wire::StreamParser;
///
/// let mut parser = StreamParser::new();
/// // 一行横跨两个数据报
/// assert!(parser.feed(b"vsd,interval:10[ms]\nid,11,12\nag").is_empty());
/// let frames = parser.feed(b"l,123,456\nvsd\n");
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].angle_deg(12), Some(45.6));
/// ```
#[derive(Debug, Default)]
pub struct StreamParser {
    partial: String,
    builder: FrameBuilder,
    /// 流里最近见过的关节顺序，跨帧保留
    last_ids: SmallVec<[JointId; INLINE_JOINTS]>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 喂入一个数据报的字节，返回本次闭合的全部帧（按到达顺序）
    ///
    /// 末尾不以 `\n` 结束时，最后的残行缓存到下一次调用。非法
    /// UTF-8 字节被丢弃。
    pub fn feed(&mut self, payload: &[u8]) -> Vec<TelemetryFrame> {
        let mut text = std::mem::take(&mut self.partial);
        for chunk in payload.utf8_chunks() {
            text.push_str(chunk.valid());
        }

        let mut frames = Vec::new();
        let mut rest = text.as_str();
        while let Some(pos) = rest.find('\n') {
            let line = &rest[..pos];
            rest = &rest[pos + 1..];
            if let Some(frame) = self.builder.consume_line(line) {
                self.last_ids = frame.ids.clone();
                frames.push(frame);
            }
        }
        self.partial = rest.to_string();
        if !self.builder.current_ids().is_empty() {
            self.last_ids = SmallVec::from_slice(self.builder.current_ids());
        }
        frames
    }

    /// 不再有后续数据时，强制闭合累积中的帧
    ///
    /// 缓存的残行先按完整行喂入（它本身可能就是闭合边界的 `vsd`
    /// 行），随后按组帧规则强制组帧。调用后解析状态清空。
    pub fn flush(&mut self) -> Option<TelemetryFrame> {
        let pending = if self.partial.is_empty() {
            None
        } else {
            let line = std::mem::take(&mut self.partial);
            self.builder.consume_line(&line)
        };
        match pending {
            Some(frame) => {
                self.builder.reset();
                Some(frame)
            }
            None => self.builder.force_build(),
        }
    }

    /// 当前缓存的残行（诊断用）
    pub fn partial_line(&self) -> &str {
        &self.partial
    }

    /// 流里最近出现的关节顺序
    ///
    /// 首帧尚未闭合时就能拿到，指令端用它采纳控制器自己的
    /// 关节排列。还没见过 id 行时为空。
    pub fn current_ids(&self) -> &[JointId] {
        &self.last_ids
    }
}
