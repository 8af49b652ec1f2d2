//! 动作映射管线
//!
//! 把可能不完整的 [`ActionRequest`] 变换成每个配置关节恰好一个
//! 目标值的 [`MappedAction`]。步骤严格有序：
//!
//! 1. 别名解析：符号名经别名表变成按 id 的覆盖值
//! 2. 直接条目：按 id 直接给出的值覆盖别名解析的结果
//! 3. 镜像（可选）：按配置的策略为对侧关节推导值
//! 4. 补全：角色允许的显式值、上次发出值、当前测量角、零，
//!    依次回退
//! 5. 角色掩码：角色之外的关节不参与第 4 步的显式值
//! 6. 增益混合：`current + gain × (target − current)`，增益 1 为
//!    直通，0 为冻结在当前测量角
//! 7. 限幅：裁剪到该关节的限位，静默（仅记日志）
//!
//! 管线是纯函数：不持外部状态，当前角与上次目标由调用方传入。

use std::collections::{HashMap, HashSet};

use tracing::debug;

use ugo_wire::JointId;

use crate::action::{ActionRequest, MappedAction};
use crate::config::{BridgeConfig, MirrorPolicy};

/// 动作映射器
///
/// 从已校验的 [`BridgeConfig`] 构造，持有解析好的排列、限位和
/// 别名表，会话期间不可变。
///
/// # 示例
///
/// ```rust
/// use std::collections::HashMap;
/// use ugo_client::{ActionMapper, ActionRequest, BridgeConfig};
///
/// let config = BridgeConfig::default();
/// let mapper = ActionMapper::new(&config);
///
/// let request = ActionRequest::new().with_target(11, 20.0);
/// let mapped = mapper.map(&request, &HashMap::new(), &HashMap::new());
/// assert_eq!(mapped.targets_deg[&11], 20.0);
/// assert_eq!(mapped.targets_deg.len(), 16);
/// ```
pub struct ActionMapper {
    ordering: Vec<JointId>,
    active: HashSet<JointId>,
    limits: HashMap<JointId, (f64, f64)>,
    aliases: HashMap<String, JointId>,
    gain: f64,
    mirror: Option<MirrorPolicy>,
    /// 左右按位置配对，PairedSignFlip 用
    pairs: Vec<(JointId, JointId)>,
}

impl ActionMapper {
    pub fn new(config: &BridgeConfig) -> Self {
        let ordering = config.canonical_ids();
        let limits = ordering
            .iter()
            .map(|&id| (id, config.limit_for(id)))
            .collect();
        let pairs = config
            .right_ids
            .iter()
            .zip(config.left_ids.iter())
            .map(|(&r, &l)| (r, l))
            .collect();
        Self {
            ordering,
            active: config.active_ids(),
            limits,
            aliases: config.aliases.clone(),
            gain: config.gain,
            mirror: config.mirror,
            pairs,
        }
    }

    /// 配置的关节数
    pub fn joint_count(&self) -> usize {
        self.ordering.len()
    }

    /// 执行映射
    ///
    /// `current` 是当前测量角（可缺、可为 NaN，均按未知处理），
    /// `previous` 是上一周期实际发出的目标。输出覆盖每个配置
    /// 关节恰好一次，不会是部分结果。
    pub fn map(
        &self,
        request: &ActionRequest,
        current: &HashMap<JointId, f64>,
        previous: &HashMap<JointId, f64>,
    ) -> MappedAction {
        let mut overrides: HashMap<JointId, f64> = HashMap::new();

        // 1. 别名解析
        for (name, &deg) in &request.named {
            match self.aliases.get(name) {
                Some(&id) if deg.is_finite() => {
                    overrides.insert(id, deg);
                }
                Some(_) => {
                    debug!(alias = %name, value = deg, "non-finite named target ignored");
                }
                None => {
                    debug!(alias = %name, "unknown alias in request, ignored");
                }
            }
        }

        // 2. 直接条目优先，同时收集速度/力矩覆盖（角色过滤）
        let mut speeds_raw = HashMap::new();
        let mut torques_raw = HashMap::new();
        for (&id, joint) in &request.joints {
            if !self.limits.contains_key(&id) {
                debug!(joint = id, "request for unconfigured joint ignored");
                continue;
            }
            if joint.target_deg.is_finite() {
                overrides.insert(id, joint.target_deg);
            } else {
                debug!(joint = id, "non-finite target ignored");
            }
            if self.active.contains(&id) {
                if let Some(v) = joint.velocity_raw {
                    speeds_raw.insert(id, v);
                }
                if let Some(v) = joint.torque_raw {
                    torques_raw.insert(id, v);
                }
            }
        }

        // 3. 镜像
        match self.mirror {
            Some(MirrorPolicy::PairedSignFlip) => {
                // 对侧取反号，显式给出的值不动
                for &(a, b) in &self.pairs {
                    match (overrides.get(&a).copied(), overrides.get(&b).copied()) {
                        (Some(v), None) => {
                            overrides.insert(b, -v);
                        }
                        (None, Some(v)) => {
                            overrides.insert(a, -v);
                        }
                        _ => {}
                    }
                }
            }
            Some(MirrorPolicy::PositionalSwap) => {
                // 前后半段整体对调，不变号；奇数长度时末位原地保留
                let half = self.ordering.len() / 2;
                let mut swapped = HashMap::with_capacity(overrides.len());
                for i in 0..half {
                    let a = self.ordering[i];
                    let b = self.ordering[i + half];
                    if let Some(&v) = overrides.get(&a) {
                        swapped.insert(b, v);
                    }
                    if let Some(&v) = overrides.get(&b) {
                        swapped.insert(a, v);
                    }
                }
                if self.ordering.len() % 2 == 1
                    && let Some(&last) = self.ordering.last()
                    && let Some(&v) = overrides.get(&last)
                {
                    swapped.insert(last, v);
                }
                overrides = swapped;
            }
            None => {}
        }

        // 4–7. 补全、角色掩码、增益、限幅
        let mut targets_deg = HashMap::with_capacity(self.ordering.len());
        for &id in &self.ordering {
            let explicit = if self.active.contains(&id) {
                overrides.get(&id).copied()
            } else {
                None
            };
            let measured = current.get(&id).copied().filter(|v| v.is_finite());
            let completed = explicit
                .or_else(|| previous.get(&id).copied().filter(|v| v.is_finite()))
                .or(measured)
                .unwrap_or(0.0);

            let blended = if self.gain < 1.0 {
                match measured {
                    Some(cur) => cur + self.gain * (completed - cur),
                    // 无有效测量时增益不起作用
                    None => completed,
                }
            } else {
                completed
            };

            let (lower, upper) = self.limits[&id];
            let clamped = blended.clamp(lower, upper);
            if clamped != blended {
                debug!(
                    joint = id,
                    requested = blended,
                    clamped, "target clamped to limits"
                );
            }
            targets_deg.insert(id, clamped);
        }

        MappedAction {
            targets_deg,
            speeds_raw,
            torques_raw,
            mode: request.mode.unwrap_or_default(),
        }
    }
}
