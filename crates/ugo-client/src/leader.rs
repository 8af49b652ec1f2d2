//! 主动端：遥测转动作
//!
//! 双边遥操作里，主动端设备（操作者手里的那台）只被读取，不被
//! 控制。[`TelemetryLeader`] 订阅它的遥测，把最新帧直接变成
//! [`ActionRequest`] 喂给随动端的桥。

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use ugo_driver::{JointStateCache, ReceiverConfig, SocketRegistry, TelemetrySubscription};

use crate::action::{ActionRequest, JointRequest};
use crate::error::BridgeError;

/// 主动端遥测源
///
/// # 示例
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use ugo_driver::{ReceiverConfig, SocketRegistry};
/// use ugo_client::TelemetryLeader;
///
/// let registry = Arc::new(SocketRegistry::new());
/// let leader = TelemetryLeader::subscribe(
///     Arc::clone(&registry),
///     &ReceiverConfig::default(),
/// ).unwrap();
///
/// let action = leader.latest_action();
/// assert!(action.is_empty() || action.source_ts_ms.is_some());
/// ```
pub struct TelemetryLeader {
    registry: Arc<SocketRegistry>,
    subscription: Option<TelemetrySubscription>,
    cache: Arc<JointStateCache>,
}

impl TelemetryLeader {
    /// 订阅主动端设备的遥测
    pub fn subscribe(
        registry: Arc<SocketRegistry>,
        config: &ReceiverConfig,
    ) -> Result<Self, BridgeError> {
        let subscription = registry.subscribe(config)?;
        let cache = subscription.cache();
        info!(addr = %subscription.local_addr(), "telemetry leader subscribed");
        Ok(Self {
            registry,
            subscription: Some(subscription),
            cache,
        })
    }

    /// 最新帧对应的动作请求
    ///
    /// 每个有有效测量角的关节一个目标值，来源时间戳取帧的接收
    /// 时间。遥测尚未到达时返回中性空请求（随动端照常走回退
    /// 链，不会被驱动到零位）。
    pub fn latest_action(&self) -> ActionRequest {
        let Some(frame) = self.cache.snapshot() else {
            return ActionRequest::new();
        };
        let mut request = ActionRequest::new();
        for (id, deg) in frame.angles_by_id() {
            if deg.is_finite() {
                request.joints.insert(id, JointRequest::target(deg));
            }
        }
        request.source_ts_ms = Some(frame.received_at_ms);
        request
    }

    /// 是否已收到过遥测
    pub fn has_telemetry(&self) -> bool {
        self.cache.has_frame()
    }

    /// 遥测 socket 的实际本地地址
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.subscription.as_ref().map(|sub| sub.local_addr())
    }

    /// 退订并释放 socket 引用
    pub fn detach(mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.registry.unsubscribe(subscription);
        }
    }
}

impl Drop for TelemetryLeader {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.registry.unsubscribe(subscription);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use ugo_link::{DatagramLink, UdpLink};

    fn loopback_config() -> ReceiverConfig {
        ReceiverConfig {
            interface: "127.0.0.1".to_string(),
            port: 0,
            poll_timeout: Duration::from_millis(20),
            ..ReceiverConfig::default()
        }
    }

    #[test]
    fn test_neutral_action_before_telemetry() {
        let registry = Arc::new(SocketRegistry::new());
        let leader =
            TelemetryLeader::subscribe(Arc::clone(&registry), &loopback_config()).unwrap();

        assert!(!leader.has_telemetry());
        let action = leader.latest_action();
        assert!(action.is_empty());
        assert_eq!(action.source_ts_ms, None);

        leader.detach();
        assert_eq!(registry.active_sockets(), 0);
    }

    #[test]
    fn test_frame_becomes_action_with_source_timestamp() {
        let registry = Arc::new(SocketRegistry::new());
        let leader =
            TelemetryLeader::subscribe(Arc::clone(&registry), &loopback_config()).unwrap();
        let addr = leader.local_addr().unwrap();

        let tx = UdpLink::connect("127.0.0.1", 0, "127.0.0.1", addr.port()).unwrap();
        tx.send(b"vsd,interval:10[ms]\nid,11,12\nagl,123,456\nvsd\n")
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !leader.has_telemetry() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(leader.has_telemetry());

        let action = leader.latest_action();
        assert_eq!(action.joints[&11].target_deg, 12.3);
        assert_eq!(action.joints[&12].target_deg, 45.6);
        assert!(action.source_ts_ms.is_some());
    }

    /// 主从共用注册表时各自退订互不影响
    #[test]
    fn test_leader_drop_unsubscribes() {
        let registry = Arc::new(SocketRegistry::new());
        {
            let _leader =
                TelemetryLeader::subscribe(Arc::clone(&registry), &loopback_config()).unwrap();
            assert_eq!(registry.active_sockets(), 1);
        }
        assert_eq!(registry.active_sockets(), 0);
    }
}
