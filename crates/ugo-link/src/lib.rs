//! # Ugo Link
//!
//! UDP 数据报传输抽象层。
//!
//! 控制器侧只有两条链路：遥测上行（控制器向主机的固定端口发包）
//! 和指令下行（主机向控制器的指令端口发包）。本层把两者统一为
//! [`DatagramLink`]，上层（接收循环、发送器）不感知具体 socket，
//! 测试可以用内存实现替换。

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub mod udp;

pub use udp::UdpLink;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("Read timeout")]
    Timeout,
}

impl LinkError {
    pub(crate) fn invalid_addr(addr: impl Into<String>, reason: impl ToString) -> Self {
        LinkError::InvalidAddress {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }
}

/// 数据报链路
///
/// 方法都以 `&self` 接收：实现必须允许接收线程与拆除路径共享
/// 同一实例（`Arc<dyn DatagramLink>`）。
pub trait DatagramLink: Send + Sync {
    /// 发送一个数据报，返回发送的字节数
    ///
    /// 零长度数据报是合法的（控制器把指令端口上的任意首包当作
    /// 遥测流的启动触发，空包即可）。
    fn send(&self, payload: &[u8]) -> Result<usize, LinkError>;

    /// 接收一个数据报
    ///
    /// 超过接收超时仍无数据时返回 [`LinkError::Timeout`]。
    fn recv(&self, buf: &mut [u8]) -> Result<usize, LinkError>;

    /// 设置接收超时，`Duration::ZERO` 表示永久阻塞
    fn set_recv_timeout(&self, timeout: Duration) -> Result<(), LinkError>;

    /// 本端地址
    fn local_addr(&self) -> Result<SocketAddr, LinkError>;
}
