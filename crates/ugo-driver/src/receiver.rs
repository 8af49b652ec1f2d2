//! 共享 socket 注册表与遥测接收循环
//!
//! 同一个进程内，遥测消费者和旁路监视器可能同时要监听同一个
//! (接口, 端口)。UDP 端口不允许重复绑定，因此绑定动作集中在
//! [`SocketRegistry`]：每个 (接口, 端口) 只绑定一次、只起一条
//! 接收线程，数据报扇出给所有订阅者，各订阅者有独立的流解析器
//! 和事件通道。最后一个订阅者退订时，socket 与线程一并拆除。
//!
//! # 事件模型
//!
//! 订阅者通过 [`TelemetrySubscription::events`] 拿到有界通道：
//!
//! - [`TelemetryEvent::Frame`]：每个闭合的遥测帧一条
//! - [`TelemetryEvent::Idle`]：链路静默超过阈值后，每个阈值周期
//!   一条，携带静默时长；恢复收包后停止
//!
//! 通道满时直接丢弃本条事件，宁可丢帧也不积压。此外每个共享
//! socket 维护一个 [`JointStateCache`]，每个闭合帧都会先写入
//! 缓存再扇出，不消费通道的订阅者也能随时拿到最新状态。

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use ugo_link::{DatagramLink, LinkError, UdpLink};
use ugo_wire::{StreamParser, TelemetryFrame};

use crate::cache::JointStateCache;
use crate::error::DriverError;

/// 接收循环在持续性 IO 错误后的退避时长
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// 送达订阅者的遥测事件
#[derive(Debug)]
pub enum TelemetryEvent {
    /// 一个闭合的遥测帧
    Frame(TelemetryFrame),
    /// 链路静默，`elapsed` 为距最后一个数据报的时长
    Idle { elapsed: Duration },
}

/// 单个订阅的接收参数
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// 本地监听地址
    pub interface: String,
    /// 本地监听端口
    pub port: u16,
    /// socket 轮询超时，决定停止标志与空闲检测的响应粒度
    pub poll_timeout: Duration,
    /// 静默多久算链路空闲
    pub idle_threshold: Duration,
    /// 单个数据报的接收缓冲
    pub buffer_size: usize,
    /// 事件通道容量
    pub channel_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            interface: "0.0.0.0".to_string(),
            port: 8886,
            poll_timeout: Duration::from_millis(200),
            idle_threshold: Duration::from_millis(300),
            buffer_size: 65535,
            channel_capacity: 64,
        }
    }
}

type SocketKey = (String, u16);

struct SubscriberSlot {
    id: u64,
    parser: StreamParser,
    events: Sender<TelemetryEvent>,
    idle_threshold: Duration,
    /// 下一次空闲事件的触发时刻
    idle_deadline: Instant,
    /// 对端 Receiver 已丢弃，等待清理
    dead: bool,
}

impl SubscriberSlot {
    fn push_event(&mut self, event: TelemetryEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                trace!(subscriber = self.id, "event queue full, dropping");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dead = true;
            }
        }
    }
}

struct SharedSocket {
    link: Arc<dyn DatagramLink>,
    stop: Arc<AtomicBool>,
    subscribers: Arc<Mutex<Vec<SubscriberSlot>>>,
    cache: Arc<JointStateCache>,
    handle: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

/// 订阅句柄
///
/// 持有事件通道的接收端。用完必须交还
/// [`SocketRegistry::unsubscribe`]，引用计数靠显式退订维护。
pub struct TelemetrySubscription {
    key: SocketKey,
    id: u64,
    local_addr: SocketAddr,
    events: Receiver<TelemetryEvent>,
    cache: Arc<JointStateCache>,
}

impl TelemetrySubscription {
    /// 事件通道
    pub fn events(&self) -> &Receiver<TelemetryEvent> {
        &self.events
    }

    /// 该 socket 上所有订阅者共享的最新帧缓存
    pub fn cache(&self) -> Arc<JointStateCache> {
        Arc::clone(&self.cache)
    }

    /// 共享 socket 的实际本地地址（端口 0 绑定后可据此取回实端口）
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// 共享 socket 注册表
///
/// 进程内构造一次，按引用传给所有需要遥测的组件。
///
/// # 示例
///
/// ```rust,no_run
/// use ugo_driver::{ReceiverConfig, SocketRegistry, TelemetryEvent};
///
/// let registry = SocketRegistry::new();
/// let sub = registry.subscribe(&ReceiverConfig::default()).unwrap();
/// match sub.events().recv().unwrap() {
///     TelemetryEvent::Frame(frame) => println!("{} joints", frame.joint_count()),
///     TelemetryEvent::Idle { elapsed } => println!("idle for {elapsed:?}"),
/// }
/// registry.unsubscribe(sub);
/// ```
#[derive(Default)]
pub struct SocketRegistry {
    sockets: Mutex<HashMap<SocketKey, SharedSocket>>,
    next_subscriber_id: AtomicU64,
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅一个 (接口, 端口) 上的遥测
    ///
    /// 该组合首次出现时绑定 socket 并启动接收线程，之后的订阅
    /// 复用同一条线路。绑定失败（端口被占、地址非法）同步返回
    /// 错误。
    ///
    /// 复用已有 socket 时沿用首个订阅者的 `poll_timeout` 与
    /// `buffer_size`，每个订阅者的 `idle_threshold` 与
    /// `channel_capacity` 彼此独立。
    pub fn subscribe(
        &self,
        config: &ReceiverConfig,
    ) -> Result<TelemetrySubscription, DriverError> {
        let key = (config.interface.clone(), config.port);
        let mut sockets = self.sockets.lock();

        let shared = match sockets.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let link = UdpLink::bind(&config.interface, config.port)?;
                link.set_recv_timeout(config.poll_timeout)?;
                let local_addr = link.local_addr()?;

                let link: Arc<dyn DatagramLink> = Arc::new(link);
                let stop = Arc::new(AtomicBool::new(false));
                let subscribers: Arc<Mutex<Vec<SubscriberSlot>>> =
                    Arc::new(Mutex::new(Vec::new()));
                let cache = Arc::new(JointStateCache::new());

                let handle = {
                    let link = Arc::clone(&link);
                    let stop = Arc::clone(&stop);
                    let subscribers = Arc::clone(&subscribers);
                    let cache = Arc::clone(&cache);
                    let buffer_size = config.buffer_size;
                    thread::Builder::new()
                        .name(format!("ugo-telemetry-{}", config.port))
                        .spawn(move || receive_loop(link, stop, subscribers, cache, buffer_size))
                        .map_err(|e| DriverError::Link(LinkError::Io(e)))?
                };

                debug!(addr = %local_addr, "telemetry socket bound, receive loop started");
                entry.insert(SharedSocket {
                    link,
                    stop,
                    subscribers,
                    cache,
                    handle: Some(handle),
                    local_addr,
                })
            }
        };

        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = bounded(config.channel_capacity);
        shared.subscribers.lock().push(SubscriberSlot {
            id,
            parser: StreamParser::new(),
            events: tx,
            idle_threshold: config.idle_threshold,
            idle_deadline: Instant::now() + config.idle_threshold,
            dead: false,
        });
        trace!(subscriber = id, addr = %shared.local_addr, "telemetry subscriber added");

        Ok(TelemetrySubscription {
            key,
            id,
            local_addr: shared.local_addr,
            events: rx,
            cache: Arc::clone(&shared.cache),
        })
    }

    /// 退订
    ///
    /// 最后一个订阅者退订时停止接收线程、关闭 socket。线程最迟
    /// 在一个轮询超时后观察到停止标志，join 的等待有界。
    pub fn unsubscribe(&self, subscription: TelemetrySubscription) {
        let mut sockets = self.sockets.lock();
        let Some(shared) = sockets.get_mut(&subscription.key) else {
            return;
        };

        let now_empty = {
            let mut subs = shared.subscribers.lock();
            subs.retain(|slot| slot.id != subscription.id);
            subs.is_empty()
        };
        trace!(subscriber = subscription.id, "telemetry subscriber removed");

        if now_empty {
            shared.stop.store(true, Ordering::Relaxed);
            if let Some(handle) = shared.handle.take()
                && handle.join().is_err()
            {
                warn!("telemetry receive thread panicked during teardown");
            }
            sockets.remove(&subscription.key);
            debug!(addr = %subscription.local_addr, "telemetry socket torn down");
        }
    }

    /// 当前活跃的共享 socket 数
    pub fn active_sockets(&self) -> usize {
        self.sockets.lock().len()
    }

    /// 某个 (接口, 端口) 请求键对应的实际绑定地址
    ///
    /// 端口 0 的订阅可据此拿到系统分配的实端口。
    pub fn local_addr(&self, interface: &str, port: u16) -> Option<SocketAddr> {
        self.sockets
            .lock()
            .get(&(interface.to_string(), port))
            .map(|shared| shared.local_addr)
    }

    /// 指定 (接口, 端口) 上的订阅者数
    pub fn subscriber_count(&self, interface: &str, port: u16) -> usize {
        self.sockets
            .lock()
            .get(&(interface.to_string(), port))
            .map(|shared| shared.subscribers.lock().len())
            .unwrap_or(0)
    }
}

impl Drop for SocketRegistry {
    fn drop(&mut self) {
        let mut sockets = self.sockets.lock();
        for (_, shared) in sockets.drain() {
            shared.stop.store(true, Ordering::Relaxed);
            if let Some(handle) = shared.handle
                && handle.join().is_err()
            {
                warn!("telemetry receive thread panicked during registry drop");
            }
        }
    }
}

/// 接收循环：短超时轮询，写缓存，扇出数据报，检测链路空闲
fn receive_loop(
    link: Arc<dyn DatagramLink>,
    stop: Arc<AtomicBool>,
    subscribers: Arc<Mutex<Vec<SubscriberSlot>>>,
    cache: Arc<JointStateCache>,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size];
    // 缓存有自己的解析器，订阅者中途加入不影响它的行边界状态
    let mut cache_parser = StreamParser::new();
    let mut last_rx = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        match link.recv(&mut buf) {
            Ok(len) => {
                last_rx = Instant::now();
                let payload = &buf[..len];
                for frame in cache_parser.feed(payload) {
                    cache.update(frame);
                }
                let mut subs = subscribers.lock();
                for slot in subs.iter_mut() {
                    for frame in slot.parser.feed(payload) {
                        trace!(
                            subscriber = slot.id,
                            joints = frame.joint_count(),
                            health = %frame.health,
                            "telemetry frame"
                        );
                        slot.push_event(TelemetryEvent::Frame(frame));
                    }
                    slot.idle_deadline = last_rx + slot.idle_threshold;
                }
                subs.retain(|slot| !slot.dead);
            }
            Err(LinkError::Timeout) => {
                let now = Instant::now();
                let mut subs = subscribers.lock();
                for slot in subs.iter_mut() {
                    if now >= slot.idle_deadline {
                        let elapsed = now - last_rx;
                        debug!(
                            subscriber = slot.id,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "telemetry idle"
                        );
                        slot.push_event(TelemetryEvent::Idle { elapsed });
                        // 每个阈值周期至多一条
                        slot.idle_deadline = now + slot.idle_threshold;
                    }
                }
                subs.retain(|slot| !slot.dead);
            }
            Err(e) => {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                warn!(error = %e, "telemetry receive failed");
                thread::sleep(RECV_ERROR_BACKOFF);
            }
        }
    }
    debug!("telemetry receive loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &[u8] =
        b"vsd,interval:10[ms]\nid,11,12\nagl,123,456\nvel,1,2\ncur,3,4\nobj,120,450\nvsd\n";

    fn test_config(idle_ms: u64) -> ReceiverConfig {
        ReceiverConfig {
            interface: "127.0.0.1".to_string(),
            port: 0,
            poll_timeout: Duration::from_millis(20),
            idle_threshold: Duration::from_millis(idle_ms),
            ..ReceiverConfig::default()
        }
    }

    fn sender_for(sub: &TelemetrySubscription) -> UdpLink {
        UdpLink::connect("127.0.0.1", 0, "127.0.0.1", sub.local_addr().port()).unwrap()
    }

    fn next_frame(sub: &TelemetrySubscription) -> TelemetryFrame {
        loop {
            match sub.events().recv_timeout(Duration::from_secs(2)).unwrap() {
                TelemetryEvent::Frame(frame) => return frame,
                TelemetryEvent::Idle { .. } => continue,
            }
        }
    }

    #[test]
    fn test_subscribe_receives_parsed_frames() {
        let registry = SocketRegistry::new();
        let sub = registry.subscribe(&test_config(500)).unwrap();
        let tx = sender_for(&sub);

        tx.send(SCENARIO).unwrap();
        let frame = next_frame(&sub);
        assert_eq!(frame.ids.as_slice(), &[11, 12]);
        assert_eq!(frame.angle_deg(11), Some(12.3));
        assert_eq!(frame.velocity_raw(12), Some(2));

        // 共享缓存在扇出前更新
        let cached = sub.cache().snapshot().unwrap();
        assert_eq!(cached.angle_deg(12), Some(45.6));

        registry.unsubscribe(sub);
        assert_eq!(registry.active_sockets(), 0);
    }

    #[test]
    fn test_line_split_across_datagrams() {
        let registry = SocketRegistry::new();
        let sub = registry.subscribe(&test_config(500)).unwrap();
        let tx = sender_for(&sub);

        tx.send(b"vsd\nid,11\nag").unwrap();
        tx.send(b"l,123\nvsd\n").unwrap();
        let frame = next_frame(&sub);
        assert_eq!(frame.angle_deg(11), Some(12.3));

        registry.unsubscribe(sub);
    }

    #[test]
    fn test_shared_socket_fans_out_to_all_subscribers() {
        let registry = SocketRegistry::new();
        // 同一请求键 (接口, 端口) 共享一个 socket，端口 0 也不例外
        let first = registry.subscribe(&test_config(500)).unwrap();
        let second = registry.subscribe(&test_config(500)).unwrap();

        assert_eq!(registry.active_sockets(), 1);
        assert_eq!(registry.subscriber_count("127.0.0.1", 0), 2);
        assert_eq!(first.local_addr(), second.local_addr());

        let tx = sender_for(&first);
        tx.send(SCENARIO).unwrap();

        let a = next_frame(&first);
        let b = next_frame(&second);
        assert_eq!(a.angle_deg(11), b.angle_deg(11));

        registry.unsubscribe(first);
        assert_eq!(registry.active_sockets(), 1);
        registry.unsubscribe(second);
        assert_eq!(registry.active_sockets(), 0);
    }

    #[test]
    fn test_idle_events_fire_once_per_period() {
        let registry = SocketRegistry::new();
        let sub = registry.subscribe(&test_config(80)).unwrap();
        let tx = sender_for(&sub);

        // 先有一个数据报，确认链路活跃
        tx.send(b"vsd\n").unwrap();
        thread::sleep(Duration::from_millis(300));

        let mut idles = 0;
        let mut first_elapsed = None;
        while let Ok(event) = sub.events().try_recv() {
            if let TelemetryEvent::Idle { elapsed } = event {
                idles += 1;
                first_elapsed.get_or_insert(elapsed);
            }
        }
        // 300ms 静默、80ms 阈值：期望约 3 条，留调度余量
        assert!((2..=5).contains(&idles), "got {idles} idle events");
        assert!(first_elapsed.unwrap() >= Duration::from_millis(80));

        registry.unsubscribe(sub);
    }

    #[test]
    fn test_no_idle_events_while_traffic_flows() {
        let registry = SocketRegistry::new();
        let sub = registry.subscribe(&test_config(150)).unwrap();
        let tx = sender_for(&sub);

        for _ in 0..10 {
            tx.send(b"vsd\n").unwrap();
            thread::sleep(Duration::from_millis(30));
        }

        let mut idles = 0;
        while let Ok(event) = sub.events().try_recv() {
            if matches!(event, TelemetryEvent::Idle { .. }) {
                idles += 1;
            }
        }
        assert_eq!(idles, 0);

        registry.unsubscribe(sub);
    }

    #[test]
    fn test_bind_conflict_surfaces_at_subscribe() {
        let registry = SocketRegistry::new();
        let sub = registry.subscribe(&test_config(500)).unwrap();
        let port = sub.local_addr().port();

        // 绕开注册表直接绑定同端口，模拟外部进程占用
        let other = SocketRegistry::new();
        let mut config = test_config(500);
        config.port = port;
        let result = other.subscribe(&config);
        assert!(matches!(result, Err(DriverError::Link(_))));

        registry.unsubscribe(sub);
    }

    #[test]
    fn test_registry_drop_stops_threads() {
        let registry = SocketRegistry::new();
        let _sub = registry.subscribe(&test_config(500)).unwrap();
        drop(registry);
        // Drop 内 join，返回即说明线程已退出
    }
}
