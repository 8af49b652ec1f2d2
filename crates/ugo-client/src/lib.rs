//! 桥接层接口模块
//!
//! 本模块提供 ugo 控制器的面向会话接口，包括：
//! - 配置实体与 TOML 加载（[`BridgeConfig`]，一次校验、会话内不可变）
//! - 定形动作请求（[`ActionRequest`]，按关节 id 索引，无字符串键解析）
//! - 映射管线（[`ActionMapper`]：别名、镜像、角色掩码、补全、增益、限幅）
//! - 随动端桥（[`UgoBridge`]：连接、观测、发送、静默保持）
//! - 主动端遥测源（[`TelemetryLeader`]，双边遥操作的另一半）
//!
//! # 使用场景
//!
//! 这是大多数用户应该使用的模块。需要直接操作数据报和解析器时，
//! 使用 `ugo-driver` 和 `ugo-wire`。

pub mod action;
pub mod bridge;
pub mod config;
pub mod error;
pub mod leader;
pub mod mapper;

pub use action::{ActionRequest, JointRequest, MappedAction};
pub use bridge::{JointObservation, Observation, UgoBridge};
pub use config::{BridgeConfig, JointLimit, MirrorPolicy, Role};
pub use error::{BridgeError, ConfigError};
pub use leader::TelemetryLeader;
pub use mapper::ActionMapper;
