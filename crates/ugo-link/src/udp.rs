//! 标准库 UDP socket 的链路实现

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::debug;

use crate::{DatagramLink, LinkError};

/// 基于 `std::net::UdpSocket` 的数据报链路
///
/// 两种构造方式对应两条链路：
///
/// - [`UdpLink::bind`]：绑定本地地址接收遥测，默认 200ms 接收
///   超时，接收循环靠它周期性醒来检查停止标志
/// - [`UdpLink::connect`]：绑定本地临时端口并 connect 到控制器
///   指令端口，之后 `send` 不再携带目的地址
pub struct UdpLink {
    socket: UdpSocket,
}

/// 默认接收超时
///
/// 接收循环以此周期检查停止标志，太长会拖慢拆除，太短会空转。
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(200);

fn resolve(host: &str, port: u16) -> Result<SocketAddr, LinkError> {
    let addr = format!("{host}:{port}");
    (host, port)
        .to_socket_addrs()
        .map_err(|e| LinkError::invalid_addr(&addr, e))?
        .next()
        .ok_or_else(|| LinkError::invalid_addr(&addr, "no address resolved"))
}

impl UdpLink {
    /// 绑定遥测接收 socket
    ///
    /// # 参数
    /// - `interface`: 本地监听地址（如 "0.0.0.0"）
    /// - `port`: 本地监听端口
    ///
    /// # 错误
    /// 端口被占用或地址非法时同步返回错误，调用方必须在构造期
    /// 处理（运行期不会再出现绑定类失败）。
    pub fn bind(interface: &str, port: u16) -> Result<Self, LinkError> {
        let local = resolve(interface, port)?;
        let socket = UdpSocket::bind(local)?;
        socket.set_read_timeout(Some(DEFAULT_RECV_TIMEOUT))?;
        debug!(addr = %local, "telemetry socket bound");
        Ok(Self { socket })
    }

    /// 建立指令发送 socket
    ///
    /// 本地绑定后 connect 到控制器指令端口，内核校验目的可达性
    /// 并允许无地址的 `send`。
    pub fn connect(
        local_host: &str,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Self, LinkError> {
        let local = resolve(local_host, local_port)?;
        let remote = resolve(remote_host, remote_port)?;
        let socket = UdpSocket::bind(local)?;
        socket.connect(remote)?;
        debug!(local = %socket.local_addr()?, remote = %remote, "command socket connected");
        Ok(Self { socket })
    }
}

impl DatagramLink for UdpLink {
    fn send(&self, payload: &[u8]) -> Result<usize, LinkError> {
        Ok(self.socket.send(payload)?)
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize, LinkError> {
        match self.socket.recv(buf) {
            Ok(len) => Ok(len),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Err(LinkError::Timeout)
            }
            Err(e) => Err(LinkError::Io(e)),
        }
    }

    fn set_recv_timeout(&self, timeout: Duration) -> Result<(), LinkError> {
        let timeout = if timeout.is_zero() { None } else { Some(timeout) };
        Ok(self.socket.set_read_timeout(timeout)?)
    }

    fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        Ok(self.socket.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral_port() {
        let link = UdpLink::bind("127.0.0.1", 0).unwrap();
        assert_ne!(link.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_bind_conflict_is_synchronous_error() {
        let first = UdpLink::bind("127.0.0.1", 0).unwrap();
        let port = first.local_addr().unwrap().port();
        let second = UdpLink::bind("127.0.0.1", port);
        assert!(matches!(second, Err(LinkError::Io(_))));
    }

    #[test]
    fn test_invalid_address_rejected() {
        let result = UdpLink::bind("999.999.0.1", 0);
        assert!(matches!(result, Err(LinkError::InvalidAddress { .. })));
    }

    #[test]
    fn test_send_and_receive_roundtrip() {
        let rx = UdpLink::bind("127.0.0.1", 0).unwrap();
        let port = rx.local_addr().unwrap().port();
        let tx = UdpLink::connect("127.0.0.1", 0, "127.0.0.1", port).unwrap();

        assert_eq!(tx.send(b"vsd\nid,11\n").unwrap(), 10);

        let mut buf = [0u8; 64];
        let len = rx.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"vsd\nid,11\n");
    }

    #[test]
    fn test_zero_length_datagram() {
        let rx = UdpLink::bind("127.0.0.1", 0).unwrap();
        let port = rx.local_addr().unwrap().port();
        let tx = UdpLink::connect("127.0.0.1", 0, "127.0.0.1", port).unwrap();

        assert_eq!(tx.send(&[]).unwrap(), 0);
        let mut buf = [0u8; 16];
        assert_eq!(rx.recv(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_recv_times_out_without_traffic() {
        let rx = UdpLink::bind("127.0.0.1", 0).unwrap();
        rx.set_recv_timeout(Duration::from_millis(20)).unwrap();

        let mut buf = [0u8; 16];
        let start = std::time::Instant::now();
        let result = rx.recv(&mut buf);
        assert!(matches!(result, Err(LinkError::Timeout)));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
