//! 控制器仿真器
//!
//! 模仿固件的遥测输出：先在指令端口等任意一个数据报（真实控制器把
//! 首包当作遥测启动触发），然后以固定包速率回放合成帧。正弦角度、
//! 带抖动的周期元数据、可选的 agl 空字段，列宽对齐和固件排版一致，
//! 因此 monitor 和生产接收路径都能拿它当真机灌数据。

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use rand::Rng;
use ugo_sdk::JointId;

/// 仿真器命令参数
#[derive(Args, Debug)]
pub struct MockCommand {
    /// 遥测目的地址
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// 遥测目的端口
    #[arg(long, default_value_t = 8886)]
    pub port: u16,

    /// 每秒数据包数
    #[arg(long, default_value_t = 10)]
    pub pps: u32,

    /// 舵机 id 集合（区间语法，如 11-18,21-28）
    #[arg(long, default_value = "11-18,21-28")]
    pub ids: String,

    /// agl 字段置空概率（0.0-1.0，用于解析容错压测）
    #[arg(long, default_value_t = 0.0)]
    pub blank_rate: f64,

    /// vsd 行携带的固件版本号
    #[arg(long, default_value_t = 251008)]
    pub ver: u32,

    /// vsd 行携带的控制模式
    #[arg(long, value_enum, default_value_t = MockMode::Bilateral)]
    pub mode: MockMode,

    /// 触发监听地址
    #[arg(long, default_value = "0.0.0.0")]
    pub trigger_host: String,

    /// 触发监听端口（真实部署即控制器的指令口 8888）
    #[arg(long, default_value_t = 8888)]
    pub trigger_port: u16,

    /// 触发等待超时（秒），缺省无限等待
    #[arg(long)]
    pub trigger_timeout: Option<f64>,
}

/// vsd 行的 mode 取值
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum MockMode {
    Bilateral,
    Normal,
}

impl MockMode {
    /// 固件把 normal 拼成 nomal，仿真保持一字不差
    fn wire_str(self) -> &'static str {
        match self {
            MockMode::Bilateral => "bilateral(1)",
            MockMode::Normal => "nomal(0)",
        }
    }
}

impl MockCommand {
    /// 等触发、开流、Ctrl+C 收尾
    pub fn execute(&self) -> Result<()> {
        let ids = parse_id_ranges(&self.ids)?;
        if ids.is_empty() {
            bail!("no servo ids parsed from --ids {:?}", self.ids);
        }

        let running = Arc::new(AtomicBool::new(true));
        let r = Arc::clone(&running);
        ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))
            .context("failed to install Ctrl+C handler")?;

        let Some(trigger_from) = self.wait_for_trigger(&running)? else {
            return Ok(());
        };

        let sock = UdpSocket::bind(("0.0.0.0", 0)).context("telemetry socket bind failed")?;
        println!(
            "📡 streaming telemetry to udp://{}:{}  pps={}  ids={:?}",
            self.host, self.port, self.pps, ids
        );
        println!(
            "   mode={}  ver={}  trigger_from={}",
            self.mode.wire_str(),
            self.ver,
            trigger_from
        );

        let mut rng = rand::thread_rng();
        let period = Duration::from_secs_f64(1.0 / f64::from(self.pps.max(1)));
        let t0 = Instant::now();
        let mut tick: u64 = 0;

        while running.load(Ordering::SeqCst) {
            let t = t0.elapsed().as_secs_f64();
            let frame = build_frame(
                &mut rng,
                &ids,
                self.ver,
                self.mode.wire_str(),
                t,
                tick,
                self.blank_rate.clamp(0.0, 1.0),
            );
            sock.send_to(frame.as_bytes(), (self.host.as_str(), self.port))
                .context("telemetry send failed")?;

            // 以发包序号推进 deadline，睡眠误差不累积
            tick += 1;
            let next = t0 + period.mul_f64(tick as f64);
            if let Some(remaining) = next.checked_duration_since(Instant::now()) {
                std::thread::sleep(remaining);
            }
        }

        println!("\n✅ mock stopped");
        Ok(())
    }

    /// 等待触发数据报，返回发送方地址；Ctrl+C 打断时返回 None
    fn wait_for_trigger(&self, running: &AtomicBool) -> Result<Option<SocketAddr>> {
        let sock = UdpSocket::bind((self.trigger_host.as_str(), self.trigger_port))
            .with_context(|| {
                format!(
                    "trigger bind failed on {}:{}",
                    self.trigger_host, self.trigger_port
                )
            })?;
        // 短超时轮询，Ctrl+C 才打得断阻塞等待
        sock.set_read_timeout(Some(Duration::from_millis(500)))
            .context("trigger socket timeout setup failed")?;

        let deadline = self
            .trigger_timeout
            .map(|secs| Instant::now() + Duration::from_secs_f64(secs));
        println!(
            "⏳ waiting for trigger on udp://{}:{} ...",
            self.trigger_host, self.trigger_port
        );

        let mut buf = [0u8; 4096];
        while running.load(Ordering::SeqCst) {
            match sock.recv_from(&mut buf) {
                Ok((len, addr)) => {
                    println!("✅ trigger received from {addr} ({len} bytes)");
                    return Ok(Some(addr));
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    if let Some(deadline) = deadline
                        && Instant::now() >= deadline
                    {
                        bail!("trigger wait timed out");
                    }
                }
                Err(err) => return Err(err).context("trigger recv failed"),
            }
        }
        Ok(None)
    }
}

/// 解析区间语法（"11-18,21-28" 或混写 "11,12,21-24"）
fn parse_id_ranges(expr: &str) -> Result<Vec<JointId>> {
    let mut ids = Vec::new();
    for part in expr.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((a, b)) = part.split_once('-') {
            let start: JointId = a
                .trim()
                .parse()
                .with_context(|| format!("invalid id range {part:?}"))?;
            let end: JointId = b
                .trim()
                .parse()
                .with_context(|| format!("invalid id range {part:?}"))?;
            ids.extend(start..=end);
        } else {
            ids.push(part.parse().with_context(|| format!("invalid id {part:?}"))?);
        }
    }
    Ok(ids)
}

/// vsd 行：周期元数据随机抖动，模仿真实固件
fn build_vsd_line(rng: &mut impl Rng, ver: u32, mode: &str) -> String {
    let interval = rng.gen_range(44..=48);
    let read = rng.gen_range(31..=32);
    let write = rng.gen_range(12..=13);
    format!("vsd, , ver:{ver}, interval:{interval}[ms], read:{read}[ms], write:{write}[ms], mode:{mode}")
}

/// 数据行：键前置一个空格，值右对齐 4 列，与固件排版一致
fn fmt_row(label: &str, values: &[i32]) -> String {
    let mut line = format!(" {label}");
    for v in values {
        line.push_str(&format!(", {v:4}"));
    }
    line
}

/// 同 [`fmt_row`]，但空单元以等宽空白占位
fn fmt_row_with_blanks(label: &str, cells: &[Option<i32>]) -> String {
    let mut line = format!(" {label}");
    for cell in cells {
        match cell {
            Some(v) => line.push_str(&format!(", {v:4}")),
            None => line.push_str(",    "),
        }
    }
    line
}

/// 每个关节一条独立的正弦轨迹（幅度和频率随索引微变）
fn gen_agl_tenths(count: usize, t: f64) -> Vec<i32> {
    (0..count)
        .map(|i| {
            let amp_deg = 30.0 + 5.0 * (0.11 * i as f64).sin();
            let freq = 0.25 + 0.02 * (i % 5) as f64;
            let val_deg = amp_deg * (std::f64::consts::TAU * freq * t + 0.3 * i as f64).sin();
            (val_deg * 10.0).round() as i32
        })
        .collect()
}

/// 偶发的 ±50 速度脉冲，其余为 0
fn gen_vel(rng: &mut impl Rng, count: usize, tick: u64) -> Vec<i32> {
    const MODULI: [u64; 3] = [53, 97, 131];
    (0..count)
        .map(|i| {
            let modulus = MODULI[rng.gen_range(0..MODULI.len())];
            if (tick + i as u64) % modulus == 0 {
                if rng.gen_bool(0.5) { 50 } else { -50 }
            } else {
                0
            }
        })
        .collect()
}

fn gen_cur(rng: &mut impl Rng, count: usize) -> Vec<i32> {
    (0..count).map(|_| rng.gen_range(-12..=12)).collect()
}

fn blank_out(rng: &mut impl Rng, values: &[i32], rate: f64) -> Vec<Option<i32>> {
    values
        .iter()
        .map(|&v| {
            if rate > 0.0 && rng.r#gen::<f64>() < rate {
                None
            } else {
                Some(v)
            }
        })
        .collect()
}

/// 单个遥测包：vsd 边界行 + id/agl/vel/cur/obj 五个系列行
fn build_frame(
    rng: &mut impl Rng,
    ids: &[JointId],
    ver: u32,
    mode: &str,
    t: f64,
    tick: u64,
    blank_rate: f64,
) -> String {
    let id_cells: Vec<i32> = ids.iter().map(|&id| i32::from(id)).collect();

    let vsd = build_vsd_line(rng, ver, mode);
    let id_row = fmt_row("id", &id_cells);
    let agl_row = fmt_row_with_blanks(
        "agl",
        &blank_out(rng, &gen_agl_tenths(ids.len(), t), blank_rate),
    );
    let vel_row = fmt_row("vel", &gen_vel(rng, ids.len(), tick));
    let cur_row = fmt_row("cur", &gen_cur(rng, ids.len()));
    let obj_row = fmt_row("obj", &vec![0; ids.len()]);

    format!("{vsd}\n{id_row}\n{agl_row}\n{vel_row}\n{cur_row}\n{obj_row}\n")
}
