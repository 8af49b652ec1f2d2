//! 指令发送器
//!
//! 把逐关节的目标角、速度、力矩组装成指令数据报并按节拍发出。
//! 组装时对每个关节做回退：本次给定的值优先，其次是最近一次
//! 实际发出的值，都没有就留空单元格让 MCU 保持现状。
//!
//! 发送端持有全局 [`RateLimiter`]，多线程同时调用
//! [`CommandTransmitter::send_command`] 时整体节拍不超配置频率。
//! 空数据报（流触发 / 保活）绕过限速器，见
//! [`CommandTransmitter::send_keepalive`]。

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace};

use ugo_link::{DatagramLink, UdpLink};
use ugo_wire::{
    CommandMode, CommandPayload, FramingMode, INLINE_JOINTS, JointId, utc_now_ms,
};

use crate::error::DriverError;
use crate::limiter::RateLimiter;

/// 发送端参数
#[derive(Debug, Clone)]
pub struct TransmitterConfig {
    /// 本地绑定地址
    pub local_interface: String,
    /// 本地绑定端口，0 为系统分配
    pub local_port: u16,
    /// MCU 地址
    pub remote_host: String,
    /// MCU 指令端口
    pub remote_port: u16,
    /// 指令组帧方式
    pub framing: FramingMode,
    /// 请求未指定控制模式时的默认值
    pub mode: CommandMode,
    /// cmd 行的 interval 字段
    pub interval_ms: u32,
    /// cmd 行的 write 字段
    pub write_ms: u32,
    /// 发送频率上限，0 不限速
    pub rate_hz: f64,
    /// 速度行的默认原始值，None 则只有请求给了速度才发速度行
    pub default_speed_raw: Option<i32>,
    /// 力矩行的默认原始值，规则同上
    pub default_torque_raw: Option<i32>,
    /// 初始关节顺序，空表示等待从遥测采纳
    pub initial_ordering: Vec<JointId>,
    /// 发送历史的保留条数
    pub history_depth: usize,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            local_interface: "0.0.0.0".to_string(),
            local_port: 0,
            remote_host: "192.168.4.40".to_string(),
            remote_port: 8888,
            framing: FramingMode::Full,
            mode: CommandMode::Absolute,
            interval_ms: 10,
            write_ms: 1,
            rate_hz: 100.0,
            default_speed_raw: Some(512),
            default_torque_raw: Some(1023),
            initial_ordering: Vec::new(),
            history_depth: 32,
        }
    }
}

/// 一次指令请求
///
/// 所有字段按关节 id 给值，缺的关节走发送端的回退链。
#[derive(Debug, Clone, Default)]
pub struct CommandRequest {
    /// 目标角（度）
    pub targets_deg: HashMap<JointId, f64>,
    /// 逐关节速度原始值
    pub speeds_raw: HashMap<JointId, i32>,
    /// 逐关节力矩原始值
    pub torques_raw: HashMap<JointId, i32>,
    /// 本次的控制模式，None 用配置默认
    pub mode: Option<CommandMode>,
    /// 追加到 cmd 行的键值对
    pub metadata: Vec<(String, String)>,
}

/// 发送历史的一条记录
#[derive(Debug, Clone)]
pub struct SentCommand {
    /// 发出的完整文本
    pub payload: String,
    /// 该数据报的控制模式
    pub mode: CommandMode,
    /// 发出时刻（UTC 毫秒）
    pub sent_at_ms: u64,
    /// 该数据报的同步计数
    pub counter: u64,
}

struct TxState {
    /// 每个关节最近一次实际发出的目标角
    last_targets: HashMap<JointId, f64>,
    counter: u64,
    history: VecDeque<SentCommand>,
}

/// UDP 指令发送器
///
/// # 示例
///
/// ```rust,no_run
/// use ugo_driver::{CommandRequest, CommandTransmitter, TransmitterConfig};
///
/// let config = TransmitterConfig {
///     initial_ordering: vec![11, 12],
///     ..TransmitterConfig::default()
/// };
/// let tx = CommandTransmitter::connect(config).unwrap();
/// tx.send_keepalive().unwrap();
///
/// let mut request = CommandRequest::default();
/// request.targets_deg.insert(11, 12.5);
/// tx.send_command(&request).unwrap();
/// ```
pub struct CommandTransmitter {
    link: Box<dyn DatagramLink>,
    config: TransmitterConfig,
    limiter: RateLimiter,
    /// 当前关节顺序，发送热路径上只读
    ordering: ArcSwap<Vec<JointId>>,
    state: Mutex<TxState>,
}

impl CommandTransmitter {
    /// 按配置建立指令链路
    pub fn connect(config: TransmitterConfig) -> Result<Self, DriverError> {
        let link = UdpLink::connect(
            &config.local_interface,
            config.local_port,
            &config.remote_host,
            config.remote_port,
        )?;
        Ok(Self::with_link(Box::new(link), config))
    }

    /// 在已有链路上构造，测试和自定义传输用
    pub fn with_link(link: Box<dyn DatagramLink>, config: TransmitterConfig) -> Self {
        let limiter = RateLimiter::from_rate_hz(config.rate_hz);
        let ordering = ArcSwap::from_pointee(config.initial_ordering.clone());
        Self {
            link,
            config,
            limiter,
            ordering,
            state: Mutex::new(TxState {
                last_targets: HashMap::new(),
                counter: 0,
                history: VecDeque::new(),
            }),
        }
    }

    /// 采纳新的关节顺序，通常来自遥测帧的 id 行
    pub fn adopt_ordering(&self, ids: &[JointId]) {
        let current = self.ordering.load();
        if current.as_slice() != ids {
            debug!(?ids, "joint ordering adopted");
            self.ordering.store(Arc::new(ids.to_vec()));
        }
    }

    /// 当前关节顺序
    pub fn ordering(&self) -> Arc<Vec<JointId>> {
        self.ordering.load_full()
    }

    /// 是否已有可用的关节顺序
    pub fn ordering_adopted(&self) -> bool {
        !self.ordering.load().is_empty()
    }

    /// 预置回退目标角，不发送
    ///
    /// 连接后先用观测到的关节角调用一次，首条指令里未指定的
    /// 关节就会停在当前位姿而不是空单元格。
    pub fn prime_targets(&self, targets: &HashMap<JointId, f64>) {
        let mut state = self.state.lock();
        for (&id, &deg) in targets {
            state.last_targets.insert(id, deg);
        }
    }

    /// 最近一次发出的逐关节目标角
    pub fn last_targets(&self) -> HashMap<JointId, f64> {
        self.state.lock().last_targets.clone()
    }

    /// 已成功发出的指令数
    pub fn sent_count(&self) -> u64 {
        self.state.lock().counter
    }

    /// 发送历史，旧在前新在后
    pub fn history(&self) -> Vec<SentCommand> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DriverError> {
        Ok(self.link.local_addr()?)
    }

    /// 发送空数据报
    ///
    /// MCU 收到空数据报即开始向源地址回流遥测，同时充当保活。
    /// 不经过限速器，也不计入发送历史。
    pub fn send_keepalive(&self) -> Result<(), DriverError> {
        self.link.send(&[])?;
        trace!("stream trigger sent");
        Ok(())
    }

    /// 组装并发送一条指令
    ///
    /// 先过限速器再发送。目标角的回退链是本次给定值、最近发出
    /// 值、空单元格；速度和力矩行只在配置了默认值或本次给了值
    /// 时出现，缺口用默认值补，没有默认值就用本次给出的首个值。
    ///
    /// # 错误
    ///
    /// 关节顺序尚未采纳时返回 [`DriverError::InvalidInput`]。
    /// 发送失败时回退目标和计数都保持不变。
    pub fn send_command(&self, request: &CommandRequest) -> Result<(), DriverError> {
        let ordering = self.ordering.load_full();
        if ordering.is_empty() {
            return Err(DriverError::InvalidInput(
                "joint ordering not adopted yet".to_string(),
            ));
        }

        self.limiter.wait();
        let mut state = self.state.lock();

        let mut targets: SmallVec<[Option<f64>; INLINE_JOINTS]> =
            SmallVec::with_capacity(ordering.len());
        for id in ordering.iter() {
            let cell = request
                .targets_deg
                .get(id)
                .or_else(|| state.last_targets.get(id))
                .copied();
            targets.push(cell);
        }

        let payload = CommandPayload {
            ids: ordering.iter().copied().collect(),
            targets_deg: targets,
            speeds_raw: assemble_int_row(
                &ordering,
                &request.speeds_raw,
                self.config.default_speed_raw,
            ),
            torques_raw: assemble_int_row(
                &ordering,
                &request.torques_raw,
                self.config.default_torque_raw,
            ),
            mode: request.mode.unwrap_or(self.config.mode),
            metadata: request.metadata.clone(),
            sync_ts_ms: utc_now_ms(),
            sync_counter: state.counter,
        };
        let text = payload.encode(
            self.config.framing,
            self.config.interval_ms,
            self.config.write_ms,
        )?;

        self.link.send(text.as_bytes())?;

        // 发送成功才落账
        for (id, cell) in ordering.iter().zip(payload.targets_deg.iter()) {
            if let Some(deg) = cell {
                state.last_targets.insert(*id, *deg);
            }
        }
        let record = SentCommand {
            mode: payload.mode,
            sent_at_ms: payload.sync_ts_ms,
            counter: state.counter,
            payload: text,
        };
        state.counter += 1;
        state.history.push_back(record);
        while state.history.len() > self.config.history_depth {
            state.history.pop_front();
        }
        trace!(counter = state.counter, "command sent");
        Ok(())
    }

    /// 发送保持指令
    ///
    /// 目标角全部走回退链（即停在最近发出的位姿），模式置为
    /// hold，`reason` 作为键值对附在 cmd 行上。
    pub fn send_hold(&self, reason: &str) -> Result<(), DriverError> {
        let request = CommandRequest {
            mode: Some(CommandMode::Hold),
            metadata: vec![("reason".to_string(), reason.to_string())],
            ..CommandRequest::default()
        };
        self.send_command(&request)
    }
}

/// 组装速度 / 力矩行
///
/// 行存在的条件：配置了默认值，或本次请求给了至少一个值。
/// 单元格取本次值，缺口用默认值，没有默认值就用首个给出的值
/// （按关节顺序扫描）。
fn assemble_int_row(
    ordering: &[JointId],
    overrides: &HashMap<JointId, i32>,
    default: Option<i32>,
) -> Option<Vec<i32>> {
    if default.is_none() && overrides.is_empty() {
        return None;
    }
    let seed = default.or_else(|| {
        ordering
            .iter()
            .find_map(|id| overrides.get(id).copied())
    })?;
    Some(
        ordering
            .iter()
            .map(|id| overrides.get(id).copied().unwrap_or(seed))
            .collect(),
    )
}
