//! 桥接配置
//!
//! 一个会话的全部参数：网络地址、关节划分、限位、别名表、
//! 随动增益与镜像策略。构造后调用 [`BridgeConfig::validate`]
//! 校验一次，之后整个会话内视为不可变。
//!
//! 支持从 TOML 加载，所有字段都有默认值，配置文件只写需要
//! 覆盖的部分：
//!
//! ```toml
//! controller_host = "192.168.4.40"
//! gain = 0.8
//! role = "right"
//!
//! [[limits]]
//! id = 11
//! lower_deg = -90.0
//! upper_deg = 90.0
//!
//! [aliases]
//! waist = 11
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use ugo_driver::{ReceiverConfig, TransmitterConfig};
use ugo_wire::{FramingMode, JointId};

use crate::error::ConfigError;

/// 角色选择：随动端实际控制哪些关节
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 全部关节
    #[default]
    Dual,
    /// 仅左侧
    Left,
    /// 仅右侧
    Right,
}

/// 镜像策略
///
/// 观测到两种互不兼容的镜像语义，必须显式选择：
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MirrorPolicy {
    /// 左右按位置配对，对侧取反号；显式给出的值不被覆盖
    PairedSignFlip,
    /// 规范顺序前后半段整体对调，不变号
    PositionalSwap,
}

/// 单个关节的限位覆盖
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JointLimit {
    pub id: JointId,
    pub lower_deg: f64,
    pub upper_deg: f64,
}

/// 桥接会话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// 遥测监听地址
    pub telemetry_host: String,
    /// 遥测监听端口
    pub telemetry_port: u16,
    /// 控制器地址
    pub controller_host: String,
    /// 控制器指令端口
    pub controller_port: u16,
    /// 指令 socket 本地绑定地址
    pub command_host: String,
    /// 指令 socket 本地端口，0 为系统分配
    pub command_port: u16,

    /// 左侧关节 id，按控制器排列
    pub left_ids: Vec<JointId>,
    /// 右侧关节 id，按控制器排列
    pub right_ids: Vec<JointId>,
    /// 逐关节限位覆盖
    pub limits: Vec<JointLimit>,
    /// 未覆盖关节的默认限位（度）
    pub default_limits_deg: (f64, f64),
    /// 符号名到关节 id 的别名表
    pub aliases: HashMap<String, JointId>,

    /// 随动增益，[0, 1]
    pub gain: f64,
    pub role: Role,
    /// 镜像策略，None 关闭镜像
    pub mirror: Option<MirrorPolicy>,
    /// 下行成帧模式
    pub framing: FramingMode,

    /// 指令频率上限（Hz），0 不限速
    pub rate_hz: f64,
    /// cmd 行 interval 字段（毫秒）
    pub interval_ms: u32,
    /// cmd 行 write 字段（毫秒）
    pub write_ms: u32,
    /// 接收轮询超时（毫秒）
    pub poll_timeout_ms: u64,
    /// 遥测静默判定阈值（毫秒）
    pub idle_threshold_ms: u64,
    /// 连接时等待首个遥测关节顺序的时限（毫秒）
    pub connect_timeout_ms: u64,
    /// 接收缓冲大小（字节）
    pub recv_buffer: usize,

    /// 速度行默认原始值
    pub default_speed_raw: Option<i32>,
    /// 力矩行默认原始值
    pub default_torque_raw: Option<i32>,
    /// 指令历史保留条数
    pub history_depth: usize,

    /// 观测里是否携带速度
    pub expose_velocity: bool,
    /// 观测里是否携带电流
    pub expose_current: bool,
    /// 观测里是否携带指令回显角
    pub expose_commanded: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            telemetry_host: "0.0.0.0".to_string(),
            telemetry_port: 8886,
            controller_host: "192.168.4.40".to_string(),
            controller_port: 8888,
            command_host: "0.0.0.0".to_string(),
            command_port: 0,
            left_ids: (21..=28).collect(),
            right_ids: (11..=18).collect(),
            limits: Vec::new(),
            default_limits_deg: (-180.0, 180.0),
            aliases: HashMap::new(),
            gain: 1.0,
            role: Role::Dual,
            mirror: None,
            framing: FramingMode::Full,
            rate_hz: 100.0,
            interval_ms: 10,
            write_ms: 1,
            poll_timeout_ms: 200,
            idle_threshold_ms: 300,
            connect_timeout_ms: 2000,
            recv_buffer: 65535,
            default_speed_raw: Some(512),
            default_torque_raw: Some(1023),
            history_depth: 32,
            expose_velocity: true,
            expose_current: true,
            expose_commanded: true,
        }
    }
}

impl BridgeConfig {
    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载并校验
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.as_ref().display(), "bridge config loaded");
        Ok(config)
    }

    /// 规范关节顺序：右侧在前、左侧在后，与控制器自身排列一致
    pub fn canonical_ids(&self) -> Vec<JointId> {
        let mut ids = Vec::with_capacity(self.right_ids.len() + self.left_ids.len());
        ids.extend_from_slice(&self.right_ids);
        ids.extend_from_slice(&self.left_ids);
        ids
    }

    /// 当前角色允许控制的关节集合
    pub fn active_ids(&self) -> HashSet<JointId> {
        match self.role {
            Role::Dual => self.canonical_ids().into_iter().collect(),
            Role::Left => self.left_ids.iter().copied().collect(),
            Role::Right => self.right_ids.iter().copied().collect(),
        }
    }

    /// 某个关节的限位，覆盖表优先，缺省用默认限位
    pub fn limit_for(&self, id: JointId) -> (f64, f64) {
        self.limits
            .iter()
            .find(|limit| limit.id == id)
            .map(|limit| (limit.lower_deg, limit.upper_deg))
            .unwrap_or(self.default_limits_deg)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// 换算出接收端参数
    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            interface: self.telemetry_host.clone(),
            port: self.telemetry_port,
            poll_timeout: self.poll_timeout(),
            idle_threshold: self.idle_threshold(),
            buffer_size: self.recv_buffer,
            ..ReceiverConfig::default()
        }
    }

    /// 换算出发送端参数
    ///
    /// 初始关节顺序留空，连接流程里从遥测采纳或回退到配置顺序。
    pub fn transmitter_config(&self) -> TransmitterConfig {
        TransmitterConfig {
            local_interface: self.command_host.clone(),
            local_port: self.command_port,
            remote_host: self.controller_host.clone(),
            remote_port: self.controller_port,
            framing: self.framing,
            interval_ms: self.interval_ms,
            write_ms: self.write_ms,
            rate_hz: self.rate_hz,
            default_speed_raw: self.default_speed_raw,
            default_torque_raw: self.default_torque_raw,
            initial_ordering: Vec::new(),
            history_depth: self.history_depth,
            ..TransmitterConfig::default()
        }
    }

    /// 校验全部不变量，构造后调用一次
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry_host.is_empty() {
            return Err(ConfigError::EmptyAddress {
                field: "telemetry_host",
            });
        }
        if self.controller_host.is_empty() {
            return Err(ConfigError::EmptyAddress {
                field: "controller_host",
            });
        }
        if self.command_host.is_empty() {
            return Err(ConfigError::EmptyAddress {
                field: "command_host",
            });
        }
        if self.telemetry_port == 0 {
            return Err(ConfigError::ZeroPort {
                field: "telemetry_port",
            });
        }
        if self.controller_port == 0 {
            return Err(ConfigError::ZeroPort {
                field: "controller_port",
            });
        }

        if self.left_ids.is_empty() {
            return Err(ConfigError::EmptyIdSet { side: "left" });
        }
        if self.right_ids.is_empty() {
            return Err(ConfigError::EmptyIdSet { side: "right" });
        }
        let right: HashSet<JointId> = self.right_ids.iter().copied().collect();
        if let Some(&id) = self.left_ids.iter().find(|id| right.contains(id)) {
            return Err(ConfigError::OverlappingIdSets { id });
        }
        let mut seen = HashSet::new();
        for &id in self.left_ids.iter().chain(self.right_ids.iter()) {
            if !seen.insert(id) {
                return Err(ConfigError::DuplicateId { id });
            }
        }

        let (lower, upper) = self.default_limits_deg;
        if !lower.is_finite() || !upper.is_finite() || lower >= upper {
            return Err(ConfigError::InvalidDefaultLimits { lower, upper });
        }
        for limit in &self.limits {
            if !seen.contains(&limit.id) {
                return Err(ConfigError::UnknownLimitId { id: limit.id });
            }
            if !limit.lower_deg.is_finite()
                || !limit.upper_deg.is_finite()
                || limit.lower_deg >= limit.upper_deg
            {
                return Err(ConfigError::InvalidLimit {
                    id: limit.id,
                    lower: limit.lower_deg,
                    upper: limit.upper_deg,
                });
            }
        }
        for (alias, &id) in &self.aliases {
            if !seen.contains(&id) {
                return Err(ConfigError::UnknownAliasTarget {
                    alias: alias.clone(),
                    id,
                });
            }
        }

        if !self.gain.is_finite() || !(0.0..=1.0).contains(&self.gain) {
            return Err(ConfigError::InvalidGain { gain: self.gain });
        }
        if !self.rate_hz.is_finite() || self.rate_hz < 0.0 {
            return Err(ConfigError::InvalidRate {
                field: "rate_hz",
                value: self.rate_hz,
            });
        }
        for (field, value) in [
            ("interval_ms", self.interval_ms as f64),
            ("write_ms", self.write_ms as f64),
            ("poll_timeout_ms", self.poll_timeout_ms as f64),
            ("idle_threshold_ms", self.idle_threshold_ms as f64),
            ("connect_timeout_ms", self.connect_timeout_ms as f64),
            ("recv_buffer", self.recv_buffer as f64),
            ("history_depth", self.history_depth as f64),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        Ok(())
    }
}
