//! 行级组帧状态机
//!
//! 控制器按行上报，一个周期内依次出现 `vsd`（边界 + 元数据）、
//! `id`、`agl`、`vel`、`cur`、`obj`。本模块把这些行累积成
//! [`TelemetryFrame`]，只在下一个 `vsd` 边界产出，保证与数据报
//! 切分方式无关。

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::frame::{FrameHealth, SeriesKey, TelemetryFrame};
use crate::timestamp::utc_now_ms;
use crate::{INLINE_JOINTS, JointId};

/// 帧边界行的键，同时携带 `key:value` 元数据
pub const KEY_BOUNDARY: &str = "vsd";
/// 关节编号行的键
pub const KEY_IDS: &str = "id";
/// 角度行的键（0.1 度单位）
pub const KEY_ANGLES: &str = "agl";
/// 速度行的键
pub const KEY_VELOCITIES: &str = "vel";
/// 电流行的键
pub const KEY_CURRENTS: &str = "cur";
/// 指令回显行的键（0.1 度单位）
pub const KEY_COMMANDED: &str = "obj";

/// 行到帧的组装器
///
/// # 组帧规则
///
/// - 帧可组装的条件：已有非空 `id` 列表且 `agl` 行在场
/// - `vsd` 行先触发组帧（若可组装），再开启新窗口并记录元数据
/// - `id` 行替换当前编号列表，且仅在至少解析出一个编号时生效；
///   编号列表跨窗口保留，直到被新的 `id` 行替换
/// - 序列行重复出现时后者覆盖前者
/// - 未知键整行忽略
///
/// 组帧时各序列按位置对齐到编号列表：不足补哨兵值（角度类补
/// NaN，整数类补 0），超出截断。
#[derive(Debug, Default)]
pub struct FrameBuilder {
    ids: SmallVec<[JointId; INLINE_JOINTS]>,
    raw_angles: Option<Vec<String>>,
    raw_velocities: Option<Vec<String>>,
    raw_currents: Option<Vec<String>>,
    raw_commanded: Option<Vec<String>>,
    metadata: BTreeMap<String, String>,
    stamp_ms: Option<u64>,
    raw_lines: Vec<String>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 喂入一行文本
    ///
    /// 行首尾空白以及每个 token 的首尾空白都会去除（真实控制器
    /// 用空格对齐列）。仅在 `vsd` 边界闭合一帧时返回 `Some`。
    pub fn consume_line(&mut self, line: &str) -> Option<TelemetryFrame> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let mut tokens = line.split(',');
        let head = tokens.next().unwrap_or_default().trim();

        match head {
            KEY_BOUNDARY => {
                let frame = self.build_if_ready();
                if frame.is_none() {
                    // 未闭合的窗口：丢弃残留序列，编号列表保留
                    self.clear_series();
                }
                self.metadata = Self::parse_metadata(tokens);
                self.stamp_ms = Some(utc_now_ms());
                self.raw_lines.push(line.to_string());
                frame
            }
            KEY_IDS => {
                let parsed: SmallVec<[JointId; INLINE_JOINTS]> =
                    tokens.filter_map(parse_joint_id).collect();
                if !parsed.is_empty() {
                    self.ids = parsed;
                }
                self.raw_lines.push(line.to_string());
                None
            }
            KEY_ANGLES | KEY_VELOCITIES | KEY_CURRENTS | KEY_COMMANDED => {
                let values: Vec<String> =
                    tokens.map(|t| t.trim().to_string()).collect();
                let slot = match head {
                    KEY_ANGLES => &mut self.raw_angles,
                    KEY_VELOCITIES => &mut self.raw_velocities,
                    KEY_CURRENTS => &mut self.raw_currents,
                    _ => &mut self.raw_commanded,
                };
                *slot = Some(values);
                self.raw_lines.push(line.to_string());
                None
            }
            _ => None,
        }
    }

    /// 强制组帧并清空全部状态
    ///
    /// 流结束（flush）时调用，不等待下一个 `vsd` 边界。不可组装
    /// 时返回 `None`，状态同样被清空。
    pub fn force_build(&mut self) -> Option<TelemetryFrame> {
        let frame = self.build_if_ready();
        self.reset();
        frame
    }

    /// 当前编号列表（可能来自上一个窗口）
    pub fn current_ids(&self) -> &[JointId] {
        &self.ids
    }

    /// 是否有未闭合的序列数据
    pub fn has_pending(&self) -> bool {
        self.raw_angles.is_some()
            || self.raw_velocities.is_some()
            || self.raw_currents.is_some()
            || self.raw_commanded.is_some()
    }

    /// 清空全部累积状态
    pub fn reset(&mut self) {
        self.ids.clear();
        self.clear_series();
        self.metadata.clear();
        self.stamp_ms = None;
        self.raw_lines.clear();
    }

    fn clear_series(&mut self) {
        self.raw_angles = None;
        self.raw_velocities = None;
        self.raw_currents = None;
        self.raw_commanded = None;
        self.raw_lines.clear();
    }

    fn build_if_ready(&mut self) -> Option<TelemetryFrame> {
        if self.ids.is_empty() {
            return None;
        }
        let raw_angles = self.raw_angles.take()?;

        let count = self.ids.len();
        let angles_deg = parse_angle_series(&raw_angles, count);

        let mut missing: SmallVec<[SeriesKey; 3]> = SmallVec::new();
        let velocities_raw = match self.raw_velocities.take() {
            Some(raw) => Some(parse_int_series(&raw, count)),
            None => {
                missing.push(SeriesKey::Velocity);
                None
            }
        };
        let currents_raw = match self.raw_currents.take() {
            Some(raw) => Some(parse_int_series(&raw, count)),
            None => {
                missing.push(SeriesKey::Current);
                None
            }
        };
        let commanded_deg = match self.raw_commanded.take() {
            Some(raw) => Some(parse_angle_series(&raw, count)),
            None => {
                missing.push(SeriesKey::Commanded);
                None
            }
        };

        let health = if missing.is_empty() {
            FrameHealth::Ok
        } else {
            FrameHealth::Partial
        };

        let frame = TelemetryFrame {
            ids: std::mem::take(&mut self.ids),
            angles_deg,
            velocities_raw,
            currents_raw,
            commanded_deg,
            metadata: std::mem::take(&mut self.metadata),
            missing_fields: missing,
            health,
            received_at_ms: self.stamp_ms.take().unwrap_or_else(utc_now_ms),
            raw_lines: std::mem::take(&mut self.raw_lines),
        };
        Some(frame)
    }

    fn parse_metadata<'a>(
        tokens: impl Iterator<Item = &'a str>,
    ) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        for token in tokens {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            // 值原样保存，含 `[ms]` 等单位后缀
            if let Some((key, value)) = token.split_once(':') {
                metadata.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        metadata
    }
}

/// 解析编号 token：先按整数，再按浮点截断，失败或超出范围则跳过
fn parse_joint_id(token: &str) -> Option<JointId> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    let value = match token.parse::<i64>() {
        Ok(v) => v,
        Err(_) => token.parse::<f64>().ok()? as i64,
    };
    JointId::try_from(value).ok()
}

/// 角度序列：0.1 度单位转度，空白或非法 token 为 NaN
fn parse_angle_series(raw: &[String], count: usize) -> SmallVec<[f64; INLINE_JOINTS]> {
    (0..count)
        .map(|i| match raw.get(i) {
            Some(token) => token
                .parse::<f64>()
                .map(|v| v / 10.0)
                .unwrap_or(f64::NAN),
            None => f64::NAN,
        })
        .collect()
}

/// 整数序列：经浮点解析后截断，空白或非法 token 为 0
fn parse_int_series(raw: &[String], count: usize) -> SmallVec<[i32; INLINE_JOINTS]> {
    (0..count)
        .map(|i| match raw.get(i) {
            Some(token) => token.parse::<f64>().map(|v| v as i32).unwrap_or(0),
            None => 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(builder: &mut FrameBuilder, lines: &[&str]) -> Vec<TelemetryFrame> {
        lines
            .iter()
            .filter_map(|line| builder.consume_line(line))
            .collect()
    }

    #[test]
    fn test_full_cycle_emits_at_boundary() {
        let mut builder = FrameBuilder::new();
        let frames = feed(
            &mut builder,
            &[
                "vsd,interval:10[ms]",
                "id,11,12",
                "agl,123,456",
                "vel,1,2",
                "cur,3,4",
                "obj,120,450",
                "vsd,interval:10[ms]",
            ],
        );
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.angle_deg(11), Some(12.3));
        assert_eq!(frame.angle_deg(12), Some(45.6));
        assert_eq!(frame.velocity_raw(11), Some(1));
        assert_eq!(frame.velocity_raw(12), Some(2));
        assert_eq!(frame.current_raw(11), Some(3));
        assert_eq!(frame.current_raw(12), Some(4));
        assert_eq!(frame.commanded_deg(11), Some(12.0));
        assert_eq!(frame.commanded_deg(12), Some(45.0));
        assert_eq!(frame.health, FrameHealth::Ok);
        assert!(frame.missing_fields.is_empty());
    }

    #[test]
    fn test_no_emit_without_boundary() {
        let mut builder = FrameBuilder::new();
        let frames = feed(&mut builder, &["vsd", "id,11", "agl,10", "vel,1"]);
        assert!(frames.is_empty());
        assert!(builder.has_pending());
    }

    #[test]
    fn test_force_build_completes_pending() {
        let mut builder = FrameBuilder::new();
        feed(&mut builder, &["vsd", "id,11", "agl,10"]);
        let frame = builder.force_build().unwrap();
        assert_eq!(frame.angle_deg(11), Some(1.0));
        assert!(!builder.has_pending());
        assert!(builder.current_ids().is_empty());
    }

    #[test]
    fn test_frame_needs_ids_and_angles() {
        let mut builder = FrameBuilder::new();
        feed(&mut builder, &["vsd", "agl,10,20"]);
        assert!(builder.force_build().is_none());

        feed(&mut builder, &["vsd", "id,11,12", "vel,1,2"]);
        assert!(builder.force_build().is_none());
    }

    #[test]
    fn test_tokens_are_trimmed() {
        // 真实控制器用空格对齐列
        let mut builder = FrameBuilder::new();
        feed(
            &mut builder,
            &[" vsd , , ver:251008, interval:44[ms]", " id , 11 , 12 ", " agl ,  123 ,  456 "],
        );
        let frame = builder.force_build().unwrap();
        assert_eq!(frame.angle_deg(11), Some(12.3));
        assert_eq!(frame.meta("ver"), Some("251008"));
        assert_eq!(frame.meta("interval"), Some("44[ms]"));
    }

    #[test]
    fn test_blank_and_invalid_angle_tokens_become_nan() {
        let mut builder = FrameBuilder::new();
        feed(&mut builder, &["vsd", "id,11,12,13", "agl,123,,abc"]);
        let frame = builder.force_build().unwrap();
        assert_eq!(frame.angle_deg(11), Some(12.3));
        assert!(frame.angle_deg(12).unwrap().is_nan());
        assert!(frame.angle_deg(13).unwrap().is_nan());
    }

    #[test]
    fn test_series_padded_and_truncated_to_id_count() {
        let mut builder = FrameBuilder::new();
        feed(
            &mut builder,
            &["vsd", "id,11,12,13", "agl,10,20,30,40", "vel,5"],
        );
        let frame = builder.force_build().unwrap();
        assert_eq!(frame.joint_count(), 3);
        assert_eq!(frame.angle_deg(13), Some(3.0));
        assert_eq!(frame.angle_deg(14), None);
        assert_eq!(frame.velocity_raw(11), Some(5));
        assert_eq!(frame.velocity_raw(12), Some(0));
        assert_eq!(frame.velocity_raw(13), Some(0));
    }

    #[test]
    fn test_id_line_accepts_float_tokens_and_skips_garbage() {
        let mut builder = FrameBuilder::new();
        feed(&mut builder, &["vsd", "id,11.0,abc,12", "agl,10,20"]);
        let frame = builder.force_build().unwrap();
        assert_eq!(frame.ids.as_slice(), &[11, 12]);
    }

    #[test]
    fn test_all_garbage_id_line_keeps_previous_ids() {
        let mut builder = FrameBuilder::new();
        let frames = feed(
            &mut builder,
            &["vsd", "id,11,12", "id,x,y", "agl,30,40", "vsd"],
        );
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].ids.as_slice(), &[11, 12]);
        assert_eq!(frames[0].angle_deg(11), Some(3.0));
    }

    #[test]
    fn test_ids_cleared_after_successful_build() {
        let mut builder = FrameBuilder::new();
        feed(&mut builder, &["vsd", "id,11", "agl,10", "vsd"]);
        assert!(builder.current_ids().is_empty());
        // 编号列表随组帧清空，仅有 agl 的新窗口不可组装
        feed(&mut builder, &["agl,20", "vsd"]);
        assert!(builder.force_build().is_none());
    }

    #[test]
    fn test_ids_survive_non_building_boundary() {
        let mut builder = FrameBuilder::new();
        // 第一个窗口缺少 agl，不可组装，但编号列表保留
        feed(&mut builder, &["vsd", "id,11,12", "vel,1,2"]);
        let frames = feed(&mut builder, &["vsd", "agl,10,20", "vsd"]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].ids.as_slice(), &[11, 12]);
        // 旧窗口的 vel 不会泄漏进新窗口
        assert!(frames[0].velocities_raw.is_none());
    }

    #[test]
    fn test_repeated_series_line_overwrites() {
        let mut builder = FrameBuilder::new();
        feed(&mut builder, &["vsd", "id,11", "agl,10", "agl,99"]);
        let frame = builder.force_build().unwrap();
        assert_eq!(frame.angle_deg(11), Some(9.9));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let mut builder = FrameBuilder::new();
        feed(
            &mut builder,
            &["vsd", "id,11", "tmp,37,38", "agl,10", "dbg,hello"],
        );
        let frame = builder.force_build().unwrap();
        assert_eq!(frame.angle_deg(11), Some(1.0));
        assert_eq!(frame.health, FrameHealth::Partial);
    }

    #[test]
    fn test_metadata_scoped_to_its_window() {
        let mut builder = FrameBuilder::new();
        let frames = feed(
            &mut builder,
            &[
                "vsd,interval:10[ms],mode:bilateral(1)",
                "id,11",
                "agl,10",
                "vsd,interval:44[ms]",
                "id,11",
                "agl,20",
                "vsd",
            ],
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].interval_ms(), Some(10.0));
        assert_eq!(frames[0].meta("mode"), Some("bilateral(1)"));
        assert_eq!(frames[1].interval_ms(), Some(44.0));
        assert_eq!(frames[1].meta("mode"), None);
    }

    #[test]
    fn test_raw_lines_recorded() {
        let mut builder = FrameBuilder::new();
        let frames = feed(&mut builder, &["vsd", "id,11", "agl,10", "vsd"]);
        assert_eq!(frames[0].raw_lines, vec!["vsd", "id,11", "agl,10"]);
    }

    #[test]
    fn test_received_at_set_at_boundary() {
        let mut builder = FrameBuilder::new();
        let before = utc_now_ms();
        feed(&mut builder, &["vsd", "id,11", "agl,10"]);
        let frame = builder.force_build().unwrap();
        let after = utc_now_ms();
        assert!(frame.received_at_ms >= before);
        assert!(frame.received_at_ms <= after);
    }
}
