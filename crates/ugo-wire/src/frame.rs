//! 遥测帧类型
//!
//! 一帧对应控制器一个上报周期内的全部行：关节编号、角度（必备）、
//! 速度 / 电流 / 指令回显（可选），以及 `vsd` 行携带的元数据。

use std::collections::BTreeMap;
use std::fmt;

use smallvec::SmallVec;

use crate::timestamp::utc_now_ms;
use crate::units::parse_leading_number;
use crate::{INLINE_JOINTS, JointId};

/// 可选序列的键
///
/// 用于 `missing_fields`，标记组帧时缺席的序列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SeriesKey {
    /// `agl` 角度（0.1 度单位）
    Angle,
    /// `vel` 速度（原始整数）
    Velocity,
    /// `cur` 电流（原始整数）
    Current,
    /// `obj` 控制器回显的指令角度（0.1 度单位）
    Commanded,
}

impl SeriesKey {
    /// 线上键名
    pub fn as_str(self) -> &'static str {
        match self {
            SeriesKey::Angle => "agl",
            SeriesKey::Velocity => "vel",
            SeriesKey::Current => "cur",
            SeriesKey::Commanded => "obj",
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 帧完整度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameHealth {
    /// 所有序列齐全
    Ok,
    /// 角度在场，但至少一个可选序列缺席
    Partial,
    /// 角度序列缺席（仅出现在合成帧中，组帧器不会产出）
    Missing,
}

impl FrameHealth {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameHealth::Ok => "ok",
            FrameHealth::Partial => "partial",
            FrameHealth::Missing => "missing",
        }
    }
}

impl fmt::Display for FrameHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一帧遥测
///
/// 所有序列与 `ids` 按位置对齐：序列比 `ids` 短时在组帧阶段已用
/// 哨兵值补齐（角度类补 NaN，整数类补 0），比 `ids` 长时已截断。
///
/// # 示例
///
/// ```rust
/// use ugo_wire::FrameBuilder;
///
/// let mut builder = FrameBuilder::new();
/// builder.consume_line("vsd,interval:10[ms]");
/// builder.consume_line("id,11,12");
/// builder.consume_line("agl,123,-56");
/// // 下一个 vsd 边界触发组帧
/// let frame = builder.consume_line("vsd,interval:10[ms]").unwrap();
///
/// assert_eq!(frame.angle_deg(11), Some(12.3));
/// assert_eq!(frame.angle_deg(12), Some(-5.6));
/// assert_eq!(frame.interval_ms(), Some(10.0));
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetryFrame {
    /// 有序关节编号，决定所有序列的位置含义
    pub ids: SmallVec<[JointId; INLINE_JOINTS]>,
    /// 角度（度），空白 token 为 NaN
    pub angles_deg: SmallVec<[f64; INLINE_JOINTS]>,
    /// 速度原始值，序列缺席时为 `None`
    pub velocities_raw: Option<SmallVec<[i32; INLINE_JOINTS]>>,
    /// 电流原始值，序列缺席时为 `None`
    pub currents_raw: Option<SmallVec<[i32; INLINE_JOINTS]>>,
    /// 控制器回显的指令角度（度），序列缺席时为 `None`
    pub commanded_deg: Option<SmallVec<[f64; INLINE_JOINTS]>>,
    /// `vsd` 行元数据，值按原样保存（含 `[ms]` 等后缀）
    pub metadata: BTreeMap<String, String>,
    /// 缺席的可选序列
    pub missing_fields: SmallVec<[SeriesKey; 3]>,
    /// 完整度分类
    pub health: FrameHealth,
    /// 接收时刻（UTC 毫秒），取自 `vsd` 行到达时刻
    pub received_at_ms: u64,
    /// 参与组帧的原始行（诊断用）
    pub raw_lines: Vec<String>,
}

impl TelemetryFrame {
    /// 关节数
    pub fn joint_count(&self) -> usize {
        self.ids.len()
    }

    /// 关节编号在序列中的位置
    pub fn index_of(&self, id: JointId) -> Option<usize> {
        self.ids.iter().position(|&j| j == id)
    }

    /// 指定关节的角度（度）
    ///
    /// 编号不在本帧中时返回 `None`；在场但 token 为空白时返回
    /// `Some(NaN)`，调用方需自行区分。
    pub fn angle_deg(&self, id: JointId) -> Option<f64> {
        self.index_of(id).map(|i| self.angles_deg[i])
    }

    /// 指定关节的速度原始值
    pub fn velocity_raw(&self, id: JointId) -> Option<i32> {
        let series = self.velocities_raw.as_ref()?;
        self.index_of(id).map(|i| series[i])
    }

    /// 指定关节的电流原始值
    pub fn current_raw(&self, id: JointId) -> Option<i32> {
        let series = self.currents_raw.as_ref()?;
        self.index_of(id).map(|i| series[i])
    }

    /// 指定关节上控制器回显的指令角度（度）
    pub fn commanded_deg(&self, id: JointId) -> Option<f64> {
        let series = self.commanded_deg.as_ref()?;
        self.index_of(id).map(|i| series[i])
    }

    /// 按 `(编号, 角度)` 迭代全部关节
    pub fn angles_by_id(&self) -> impl Iterator<Item = (JointId, f64)> + '_ {
        self.ids.iter().copied().zip(self.angles_deg.iter().copied())
    }

    /// 元数据原始值
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// 元数据的数值前缀（`10[ms]` 解析为 10.0）
    pub fn meta_number(&self, key: &str) -> Option<f64> {
        parse_leading_number(self.meta(key)?)
    }

    /// `interval` 元数据（毫秒）
    pub fn interval_ms(&self) -> Option<f64> {
        self.meta_number("interval")
    }

    /// `read` 元数据（毫秒）
    pub fn read_ms(&self) -> Option<f64> {
        self.meta_number("read")
    }

    /// `write` 元数据（毫秒）
    pub fn write_ms(&self) -> Option<f64> {
        self.meta_number("write")
    }

    /// 帧龄（毫秒），以当前 UTC 时间与接收时刻之差计
    pub fn age_ms(&self) -> u64 {
        utc_now_ms().saturating_sub(self.received_at_ms)
    }

    /// 角度序列缺席的合成帧（尚无遥测时填充观测用）
    pub fn synthetic_missing(ids: &[JointId]) -> Self {
        Self {
            ids: SmallVec::from_slice(ids),
            angles_deg: ids.iter().map(|_| f64::NAN).collect(),
            velocities_raw: None,
            currents_raw: None,
            commanded_deg: None,
            metadata: BTreeMap::new(),
            missing_fields: SmallVec::from_slice(&[
                SeriesKey::Angle,
                SeriesKey::Velocity,
                SeriesKey::Current,
                SeriesKey::Commanded,
            ]),
            health: FrameHealth::Missing,
            received_at_ms: utc_now_ms(),
            raw_lines: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> TelemetryFrame {
        let mut builder = crate::FrameBuilder::new();
        builder.consume_line("vsd, ,ver:251008,interval:44[ms]");
        builder.consume_line("id,11,12");
        builder.consume_line("agl,123,");
        builder.consume_line("vel,1,2");
        builder.force_build().unwrap()
    }

    #[test]
    fn test_angle_accessor_distinguishes_unknown_and_blank() {
        let frame = sample_frame();
        assert_eq!(frame.angle_deg(11), Some(12.3));
        assert!(frame.angle_deg(12).unwrap().is_nan());
        assert_eq!(frame.angle_deg(99), None);
    }

    #[test]
    fn test_optional_series_accessors() {
        let frame = sample_frame();
        assert_eq!(frame.velocity_raw(11), Some(1));
        assert_eq!(frame.current_raw(11), None);
        assert_eq!(frame.commanded_deg(11), None);
    }

    #[test]
    fn test_metadata_value_kept_verbatim() {
        let frame = sample_frame();
        assert_eq!(frame.meta("interval"), Some("44[ms]"));
        assert_eq!(frame.interval_ms(), Some(44.0));
        assert_eq!(frame.meta("ver"), Some("251008"));
    }

    #[test]
    fn test_health_classification() {
        let frame = sample_frame();
        assert_eq!(frame.health, FrameHealth::Partial);
        assert!(frame.missing_fields.contains(&SeriesKey::Current));
        assert!(frame.missing_fields.contains(&SeriesKey::Commanded));
        assert!(!frame.missing_fields.contains(&SeriesKey::Velocity));
    }

    #[test]
    fn test_synthetic_missing_frame() {
        let frame = TelemetryFrame::synthetic_missing(&[11, 12]);
        assert_eq!(frame.health, FrameHealth::Missing);
        assert_eq!(frame.joint_count(), 2);
        assert!(frame.angle_deg(11).unwrap().is_nan());
        assert!(frame.missing_fields.contains(&SeriesKey::Angle));
    }

    #[test]
    fn test_health_as_str() {
        assert_eq!(FrameHealth::Ok.as_str(), "ok");
        assert_eq!(FrameHealth::Partial.as_str(), "partial");
        assert_eq!(FrameHealth::Missing.as_str(), "missing");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_frame_serializes_to_json() {
        let frame = sample_frame();
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"ids\":[11,12]"));
        assert!(json.contains("\"health\":\"Partial\""));
    }
}
