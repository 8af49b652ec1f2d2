//! 指令报文构建
//!
//! 主机到控制器的下行报文与遥测同为行式 CSV。观测到两种成帧
//! 模式，作为显式配置暴露：
//!
//! - [`FramingMode::Full`]：多行报文（`cmd` 元数据行、`id` 行、
//!   `tar` 目标行、可选 `spd`/`trq` 行、`sync` 同步行）
//! - [`FramingMode::Compact`]：仅一行目标值（0.1 度单位整数）
//!
//! 本模块只负责文本渲染，回退补全与节拍控制在发送侧完成。

use std::fmt;
use std::fmt::Write as _;

use smallvec::SmallVec;
use thiserror::Error;

use crate::units::encode_tenths;
use crate::{INLINE_JOINTS, JointId};

/// 指令语义标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CommandMode {
    /// 绝对目标角度
    #[default]
    Absolute,
    /// 相对增量
    Relative,
    /// 保持当前位置（遥测静默时的失效保护）
    Hold,
}

impl CommandMode {
    /// 线上标签
    pub fn as_str(self) -> &'static str {
        match self {
            CommandMode::Absolute => "abs",
            CommandMode::Relative => "rel",
            CommandMode::Hold => "hold",
        }
    }
}

impl fmt::Display for CommandMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 下行报文的成帧模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FramingMode {
    /// 完整多行报文
    #[default]
    Full,
    /// 单行目标值
    Compact,
}

/// 报文构建错误
#[derive(Debug, Error)]
pub enum WireError {
    #[error("command payload requires at least one joint id")]
    EmptyIds,

    #[error("{series} length {actual} does not match id count {expected}")]
    LengthMismatch {
        series: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// 一次发送的完整描述
///
/// `targets_deg` 与 `ids` 按位置对齐，`None` 渲染为空字段（回退
/// 链穷尽后仍无值的关节）。`speeds_raw`/`torques_raw` 短于 `ids`
/// 时用各自最后一个值补齐，这是控制器固件的约定。
#[derive(Debug, Clone)]
pub struct CommandPayload {
    pub ids: SmallVec<[JointId; INLINE_JOINTS]>,
    pub targets_deg: SmallVec<[Option<f64>; INLINE_JOINTS]>,
    pub speeds_raw: Option<Vec<i32>>,
    pub torques_raw: Option<Vec<i32>>,
    pub mode: CommandMode,
    /// 附加进 `cmd` 行的 `key:value` 对（如失效保护原因）
    pub metadata: Vec<(String, String)>,
    /// `sync` 行时间戳（UTC 毫秒）
    pub sync_ts_ms: u64,
    /// `sync` 行单调递增计数
    pub sync_counter: u64,
}

impl CommandPayload {
    /// 渲染为待发送的报文文本（末尾带 `\n`）
    ///
    /// # 错误
    ///
    /// - `ids` 为空时返回 [`WireError::EmptyIds`]
    /// - `targets_deg` 长度与 `ids` 不一致时返回
    ///   [`WireError::LengthMismatch`]
    pub fn encode(
        &self,
        framing: FramingMode,
        interval_ms: u32,
        write_ms: u32,
    ) -> Result<String, WireError> {
        if self.ids.is_empty() {
            return Err(WireError::EmptyIds);
        }
        if self.targets_deg.len() != self.ids.len() {
            return Err(WireError::LengthMismatch {
                series: "targets_deg",
                expected: self.ids.len(),
                actual: self.targets_deg.len(),
            });
        }

        match framing {
            FramingMode::Compact => Ok(self.encode_compact()),
            FramingMode::Full => Ok(self.encode_full(interval_ms, write_ms)),
        }
    }

    fn encode_compact(&self) -> String {
        let mut line = String::new();
        for (idx, target) in self.targets_deg.iter().enumerate() {
            if idx > 0 {
                line.push(',');
            }
            if let Some(deg) = target {
                let _ = write!(line, "{}", encode_tenths(*deg));
            }
        }
        line.push('\n');
        line
    }

    fn encode_full(&self, interval_ms: u32, write_ms: u32) -> String {
        let mut text = String::new();

        let _ = write!(
            text,
            "cmd,interval:{interval_ms}[ms],write:{write_ms}[ms],mode:{}",
            self.mode
        );
        for (key, value) in &self.metadata {
            let _ = write!(text, ",{key}:{value}");
        }
        text.push('\n');

        text.push_str("id");
        for id in &self.ids {
            let _ = write!(text, ",{id}");
        }
        text.push('\n');

        text.push_str("tar");
        for target in &self.targets_deg {
            text.push(',');
            if let Some(deg) = target {
                let _ = write!(text, "{}", encode_tenths(*deg));
            }
        }
        text.push('\n');

        if let Some(speeds) = &self.speeds_raw
            && !speeds.is_empty()
        {
            Self::push_padded_row(&mut text, "spd", speeds, self.ids.len());
        }
        if let Some(torques) = &self.torques_raw
            && !torques.is_empty()
        {
            Self::push_padded_row(&mut text, "trq", torques, self.ids.len());
        }

        let _ = writeln!(text, "sync,{},{}", self.sync_ts_ms, self.sync_counter);
        text
    }

    // 短序列用最后一个值补齐到关节数，超出截断
    fn push_padded_row(text: &mut String, header: &str, values: &[i32], count: usize) {
        text.push_str(header);
        let last = values[values.len() - 1];
        for idx in 0..count {
            let value = values.get(idx).copied().unwrap_or(last);
            let _ = write!(text, ",{value}");
        }
        text.push('\n');
    }
}
