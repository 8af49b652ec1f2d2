//! # Ugo SDK
//!
//! ugo 机械臂控制器的统一入口 crate。
//!
//! 按层重导出下列 crates 的公开类型，应用只需依赖本 crate：
//!
//! - [`ugo_wire`]: 行式 CSV 协议的解析与编码（无 I/O）
//! - [`ugo_link`]: UDP 数据报链路抽象
//! - [`ugo_driver`]: 接收线程、指令节流、遥测缓存
//! - [`ugo_client`]: 配置、动作映射管线、随动 / 主动端 API
//!
//! ## 使用场景
//!
//! 大多数应用只需要 [`UgoBridge`]：
//!
//! ```no_run
//! use ugo_sdk::{ActionRequest, BridgeConfig, UgoBridge};
//!
//! ugo_sdk::init_logging();
//!
//! let mut bridge = UgoBridge::new(BridgeConfig::default())?;
//! bridge.connect()?;
//!
//! let obs = bridge.observation()?;
//! println!("joints: {}", obs.joints.len());
//!
//! bridge.send_action(&ActionRequest::new().with_target(11, 30.0))?;
//! # Ok::<(), ugo_sdk::BridgeError>(())
//! ```
//!
//! 需要更细粒度控制（自建接收线程、直接操作发送器）时，
//! 从 [`driver`] 和 [`wire`] 取底层类型。

pub use ugo_client as client;
pub use ugo_driver as driver;
pub use ugo_link as link;
pub use ugo_wire as wire;

// 高层 API（大多数应用的全部所需）
pub use ugo_client::{
    ActionMapper, ActionRequest, BridgeConfig, BridgeError, ConfigError, JointLimit,
    JointObservation, JointRequest, MappedAction, MirrorPolicy, Observation, Role,
    TelemetryLeader, UgoBridge,
};

// 驱动层（自定义线程模型时使用）
pub use ugo_driver::{
    CommandRequest, CommandTransmitter, DriverError, JointStateCache, ReceiverConfig,
    SocketRegistry, TelemetryEvent, TelemetrySubscription, TransmitterConfig,
};

// 协议层常用类型
pub use ugo_wire::{
    CommandMode, FrameHealth, FramingMode, JointId, StreamParser, TelemetryFrame, WireError,
};

// 链路层
pub use ugo_link::{DatagramLink, LinkError, UdpLink};

/// 初始化全局日志订阅者
///
/// 行为：
///
/// - 把 `log` 宏产生的记录桥接到 `tracing`（部分依赖仍使用 `log`）
/// - 过滤规则取 `RUST_LOG` 环境变量，未设置时默认 `info`
/// - 重复调用是安全的，后续调用不做任何事
///
/// 应用若需要自定义订阅者（JSON 输出、OpenTelemetry 等），跳过本
/// 函数自行初始化即可，SDK 内部只使用 `tracing` 宏，不依赖具体
/// 订阅者实现。
///
/// # 示例
///
/// ```
/// ugo_sdk::init_logging();
/// tracing::info!("logging ready");
/// ```
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    // log -> tracing 桥；重复初始化返回 Err，直接忽略
    let _ = tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
        tracing::debug!("still alive after double init");
    }

    #[test]
    fn test_facade_reexports_compose() {
        // 高层与底层类型来自同一套定义，可以直接互通
        let config = BridgeConfig::default();
        let ids: Vec<JointId> = config.canonical_ids();
        assert_eq!(ids.len(), 16);

        let frame = TelemetryFrame::synthetic_missing(&ids);
        assert_eq!(frame.joint_count(), 16);
        assert_eq!(frame.health, FrameHealth::Missing);
    }
}
