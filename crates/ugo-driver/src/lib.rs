//! # Ugo Driver
//!
//! 遥测接收与指令发送的驱动层。
//!
//! ## 模块
//!
//! - `receiver`: 共享 socket 注册表与后台接收循环（帧与空闲事件
//!   经 channel 送达订阅者）
//! - `cache`: 最新遥测帧的单槽缓存，接收线程与控制线程之间唯一
//!   的共享状态
//! - `transmitter`: 节拍受控的指令发送器（回退补全、保持指令、
//!   空包触发）
//! - `limiter`: 单调时钟节拍闸
//! - `error`: 驱动层错误类型
//!
//! ## 线程模型
//!
//! 每个 (接口, 端口) 只有一条接收线程，数据报扇出给所有订阅者。
//! 控制线程通过 [`JointStateCache`] 读取最新状态，通过
//! [`CommandTransmitter`] 发送指令，两者之外没有跨线程可变状态。

pub mod cache;
pub mod error;
pub mod limiter;
pub mod receiver;
pub mod transmitter;

pub use cache::JointStateCache;
pub use error::DriverError;
pub use limiter::RateLimiter;
pub use receiver::{ReceiverConfig, SocketRegistry, TelemetryEvent, TelemetrySubscription};
pub use transmitter::{CommandRequest, CommandTransmitter, SentCommand, TransmitterConfig};
