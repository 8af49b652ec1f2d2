//! 动作请求与映射结果的数据形状
//!
//! 请求是定形结构：逐关节条目按 id 索引，符号名走单独的别名
//! 字段，没有任何运行时字符串键解析。允许部分给值，映射管线
//! 负责补全。

use std::collections::HashMap;

use ugo_wire::{CommandMode, JointId};

/// 单个关节的请求条目
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointRequest {
    /// 目标角（度）
    pub target_deg: f64,
    /// 本关节的速度原始值覆盖
    pub velocity_raw: Option<i32>,
    /// 本关节的力矩原始值覆盖
    pub torque_raw: Option<i32>,
}

impl JointRequest {
    /// 只给目标角的条目
    pub fn target(target_deg: f64) -> Self {
        Self {
            target_deg,
            velocity_raw: None,
            torque_raw: None,
        }
    }
}

/// 一次（可能不完整的）动作请求
///
/// # 示例
///
/// ```rust
/// use ugo_client::ActionRequest;
///
/// let request = ActionRequest::new()
///     .with_target(11, 12.5)
///     .with_named("waist", -4.0);
/// assert!(!request.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ActionRequest {
    /// 直接按关节 id 给值的条目，优先级高于别名
    pub joints: HashMap<JointId, JointRequest>,
    /// 按符号名给出的目标角，经配置的别名表解析
    pub named: HashMap<String, f64>,
    /// 本次的控制模式，None 用默认
    pub mode: Option<CommandMode>,
    /// 动作来源时间戳（UTC 毫秒），遥测驱动的请求会带上
    pub source_ts_ms: Option<u64>,
}

impl ActionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, id: JointId, target_deg: f64) -> Self {
        self.joints.insert(id, JointRequest::target(target_deg));
        self
    }

    pub fn with_joint(mut self, id: JointId, joint: JointRequest) -> Self {
        self.joints.insert(id, joint);
        self
    }

    pub fn with_named(mut self, name: &str, target_deg: f64) -> Self {
        self.named.insert(name.to_string(), target_deg);
        self
    }

    pub fn with_mode(mut self, mode: CommandMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// 没有任何目标值（中性请求，随动端照常走回退链）
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty() && self.named.is_empty()
    }
}

/// 映射管线的输出：每个配置关节恰好一个目标值
#[derive(Debug, Clone, PartialEq)]
pub struct MappedAction {
    /// 补全并限幅后的逐关节目标角
    pub targets_deg: HashMap<JointId, f64>,
    /// 角色过滤后的速度覆盖
    pub speeds_raw: HashMap<JointId, i32>,
    /// 角色过滤后的力矩覆盖
    pub torques_raw: HashMap<JointId, i32>,
    pub mode: CommandMode,
}
