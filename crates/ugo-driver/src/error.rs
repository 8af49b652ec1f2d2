//! 驱动层错误类型定义

use thiserror::Error;
use ugo_link::LinkError;
use ugo_wire::WireError;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输层错误（socket 绑定、发送失败）
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// 报文构建错误
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    /// 事件通道已关闭（接收线程退出）
    #[error("Telemetry event channel closed")]
    ChannelClosed,

    /// 无效输入（如空的关节顺序）
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
