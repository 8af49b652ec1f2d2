//! 随动端桥接
//!
//! [`UgoBridge`] 把配置、注册表订阅、指令发送器和映射管线装配
//! 成一个随动端点：上层给它部分动作请求，它产出完整的限幅
//! 指令；遥测静默时自动下发保持指令。
//!
//! # 使用场景
//!
//! ```rust,no_run
//! use ugo_client::{ActionRequest, BridgeConfig, UgoBridge};
//!
//! let mut bridge = UgoBridge::new(BridgeConfig::default()).unwrap();
//! bridge.connect().unwrap();
//!
//! loop {
//!     let obs = bridge.observation().unwrap();
//!     let request = ActionRequest::new().with_target(11, 12.5);
//!     bridge.send_action(&request).unwrap();
//!     # break;
//! }
//! ```
//!
//! 方法都在调用方的控制线程上执行，桥自身不起线程；接收线程
//! 由注册表托管。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use ugo_driver::{
    CommandRequest, CommandTransmitter, DriverError, JointStateCache, SentCommand,
    SocketRegistry, TelemetryEvent, TelemetrySubscription,
};
use ugo_wire::{FrameHealth, JointId, TelemetryFrame};

use crate::action::ActionRequest;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::mapper::ActionMapper;

/// 单个关节的扁平观测
#[derive(Debug, Clone, Serialize)]
pub struct JointObservation {
    pub id: JointId,
    /// 测量角（度），未知为 NaN
    pub angle_deg: f64,
    pub commanded_deg: Option<f64>,
    pub velocity_raw: Option<i32>,
    pub current_raw: Option<i32>,
}

/// 扁平化的随动端观测
///
/// 字段语义与遥测帧一致；没有帧时角度全为 NaN、健康度为
/// `missing`，不报错。
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    /// 按规范顺序排列的逐关节观测
    pub joints: Vec<JointObservation>,
    /// 最新帧的年龄（毫秒），无帧为 NaN
    pub age_ms: f64,
    /// 帧元数据 interval（毫秒），缺省 NaN
    pub interval_ms: f64,
    /// 帧元数据 read（毫秒），缺省 NaN
    pub read_ms: f64,
    /// 帧元数据 write（毫秒），缺省 NaN
    pub write_ms: f64,
    pub health: FrameHealth,
    /// 该帧缺失的序列数
    pub missing_fields: usize,
}

impl Observation {
    /// 是否基于真实遥测帧（而非合成占位）
    pub fn is_live(&self) -> bool {
        !self.age_ms.is_nan()
    }

    pub fn angle_of(&self, id: JointId) -> Option<f64> {
        self.joints
            .iter()
            .find(|joint| joint.id == id)
            .map(|joint| joint.angle_deg)
    }
}

/// 随动端桥
pub struct UgoBridge {
    config: BridgeConfig,
    mapper: ActionMapper,
    registry: Arc<SocketRegistry>,
    subscription: Option<TelemetrySubscription>,
    cache: Option<Arc<JointStateCache>>,
    transmitter: Option<CommandTransmitter>,
}

impl UgoBridge {
    /// 校验配置并构造（不建立连接）
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        Self::with_registry(config, Arc::new(SocketRegistry::new()))
    }

    /// 在共享注册表上构造，主从同进程时复用 socket
    pub fn with_registry(
        config: BridgeConfig,
        registry: Arc<SocketRegistry>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let mapper = ActionMapper::new(&config);
        Ok(Self {
            config,
            mapper,
            registry,
            subscription: None,
            cache: None,
            transmitter: None,
        })
    }

    /// 建立会话
    ///
    /// 依次：建立指令链路（绑定/连接失败直接报错）、发送流触发
    /// 空包、订阅遥测，然后在时限内等待首帧并采纳控制器的关节
    /// 顺序；超时则回退到配置顺序并告警。重复调用报
    /// [`BridgeError::AlreadyConnected`]。
    pub fn connect(&mut self) -> Result<(), BridgeError> {
        if self.transmitter.is_some() {
            return Err(BridgeError::AlreadyConnected);
        }

        let transmitter = CommandTransmitter::connect(self.config.transmitter_config())?;
        transmitter.send_keepalive()?;
        let subscription = self.registry.subscribe(&self.config.receiver_config())?;
        let cache = subscription.cache();

        let deadline = Instant::now() + self.config.connect_timeout();
        let mut adopted = false;
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            match subscription.events().recv_timeout(remaining) {
                Ok(TelemetryEvent::Frame(frame)) if !frame.ids.is_empty() => {
                    info!(ids = ?frame.ids, "joint ordering adopted from telemetry");
                    transmitter.adopt_ordering(&frame.ids);
                    // 起步位姿：首条指令里未给值的关节停在当前角
                    transmitter.prime_targets(&finite_angles(&frame));
                    adopted = true;
                    break;
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        if !adopted {
            warn!(
                timeout_ms = self.config.connect_timeout_ms,
                "no telemetry yet, falling back to configured joint order"
            );
            transmitter.adopt_ordering(&self.config.canonical_ids());
        }

        info!(
            controller = %self.config.controller_host,
            port = self.config.controller_port,
            "bridge connected"
        );
        self.transmitter = Some(transmitter);
        self.subscription = Some(subscription);
        self.cache = Some(cache);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.transmitter.is_some()
    }

    /// 遥测 socket 的实际本地地址
    pub fn telemetry_addr(&self) -> Option<SocketAddr> {
        self.subscription.as_ref().map(|sub| sub.local_addr())
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// 当前观测
    ///
    /// 尚无遥测帧时返回全 NaN 的合成观测而不是错误，上层循环
    /// 不需要特判冷启动。
    pub fn observation(&self) -> Result<Observation, BridgeError> {
        let cache = self.cache.as_ref().ok_or(BridgeError::NotConnected)?;
        let snapshot = cache.snapshot();
        let ids = self.config.canonical_ids();

        let synth;
        let frame = match &snapshot {
            Some(arc) => arc.as_ref(),
            None => {
                synth = TelemetryFrame::synthetic_missing(&ids);
                &synth
            }
        };

        let joints = ids
            .iter()
            .map(|&id| JointObservation {
                id,
                angle_deg: frame.angle_deg(id).unwrap_or(f64::NAN),
                commanded_deg: self
                    .config
                    .expose_commanded
                    .then(|| frame.commanded_deg(id))
                    .flatten(),
                velocity_raw: self
                    .config
                    .expose_velocity
                    .then(|| frame.velocity_raw(id))
                    .flatten(),
                current_raw: self
                    .config
                    .expose_current
                    .then(|| frame.current_raw(id))
                    .flatten(),
            })
            .collect();

        Ok(Observation {
            joints,
            age_ms: snapshot
                .as_ref()
                .map(|f| f.age_ms() as f64)
                .unwrap_or(f64::NAN),
            interval_ms: frame.interval_ms().unwrap_or(f64::NAN),
            read_ms: frame.read_ms().unwrap_or(f64::NAN),
            write_ms: frame.write_ms().unwrap_or(f64::NAN),
            health: frame.health,
            missing_fields: frame.missing_fields.len(),
        })
    }

    /// 映射并发送一个动作
    ///
    /// 先泵一遍事件通道（处理积压的遥测和静默事件），再走映射
    /// 管线。链路级发送失败记日志但不报错，控制环继续跑；其余
    /// 错误（未连接等）正常上抛。
    pub fn send_action(&mut self, request: &ActionRequest) -> Result<(), BridgeError> {
        self.pump_events();
        let transmitter = self.transmitter.as_ref().ok_or(BridgeError::NotConnected)?;
        let cache = self.cache.as_ref().ok_or(BridgeError::NotConnected)?;

        let previous = transmitter.last_targets();
        let current = match cache.snapshot() {
            Some(frame) => finite_angles(&frame),
            // 无遥测时用上次发出的位姿顶替测量角
            None => previous.clone(),
        };
        let mapped = self.mapper.map(request, &current, &previous);

        let mut command = CommandRequest {
            targets_deg: mapped.targets_deg,
            speeds_raw: mapped.speeds_raw,
            torques_raw: mapped.torques_raw,
            mode: Some(mapped.mode),
            metadata: Vec::new(),
        };
        if let Some(ts) = request.source_ts_ms {
            command.metadata.push(("src".to_string(), ts.to_string()));
        }

        match transmitter.send_command(&command) {
            Ok(()) => Ok(()),
            Err(DriverError::Link(e)) => {
                warn!(error = %e, "command send failed, keeping session");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 排空事件通道，返回期间看到的帧数
    ///
    /// 帧事件用于跟进关节顺序变化；静默事件触发保持指令
    /// （`reason:telemetry_timeout`），其发送失败只记日志。
    pub fn pump_events(&mut self) -> usize {
        let Some(subscription) = &self.subscription else {
            return 0;
        };
        let mut frames = 0;
        while let Ok(event) = subscription.events().try_recv() {
            match event {
                TelemetryEvent::Frame(frame) => {
                    frames += 1;
                    if let Some(tx) = &self.transmitter
                        && !frame.ids.is_empty()
                    {
                        tx.adopt_ordering(&frame.ids);
                    }
                }
                TelemetryEvent::Idle { elapsed } => {
                    warn!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        "telemetry idle, sending hold"
                    );
                    if let Some(tx) = &self.transmitter
                        && let Err(e) = tx.send_hold("telemetry_timeout")
                    {
                        warn!(error = %e, "hold command failed");
                    }
                }
            }
        }
        frames
    }

    /// 指令发送历史（旧在前）
    pub fn command_history(&self) -> Vec<SentCommand> {
        self.transmitter
            .as_ref()
            .map(|tx| tx.history())
            .unwrap_or_default()
    }

    /// 断开会话，幂等
    pub fn disconnect(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.registry.unsubscribe(subscription);
        }
        self.cache = None;
        if self.transmitter.take().is_some() {
            info!("bridge disconnected");
        } else {
            debug!("disconnect on unconnected bridge, nothing to do");
        }
    }
}

impl Drop for UgoBridge {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.registry.unsubscribe(subscription);
        }
    }
}

/// 帧里的有限测量角，NaN 占位的关节剔除
fn finite_angles(frame: &TelemetryFrame) -> HashMap<JointId, f64> {
    frame
        .angles_by_id()
        .filter(|(_, deg)| deg.is_finite())
        .collect()
}
