//! 实时遥测监控
//!
//! 通过 [`SocketRegistry`] 订阅遥测端口，按固定刷新率把缓存里的
//! 最新帧渲染成表格。接收与渲染解耦：后台线程持续更新缓存，本命令
//! 只在刷新点读快照，包速率再高也不会拖慢渲染。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use ugo_sdk::{ReceiverConfig, SocketRegistry, TelemetryEvent, TelemetryFrame};

/// 监控命令参数
#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 遥测绑定地址
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// 遥测绑定端口
    #[arg(long, default_value_t = 8886)]
    pub port: u16,

    /// 刷新频率（Hz）
    #[arg(long, default_value_t = 20.0)]
    pub fps: f64,
}

impl MonitorCommand {
    /// 订阅并循环渲染，Ctrl+C 退出
    pub fn execute(&self) -> Result<()> {
        let registry = SocketRegistry::new();
        let config = ReceiverConfig {
            interface: self.host.clone(),
            port: self.port,
            ..ReceiverConfig::default()
        };
        let sub = registry.subscribe(&config)?;
        let cache = sub.cache();

        println!("📡 listening on udp://{}", sub.local_addr());
        println!("按 Ctrl+C 停止\n");

        let running = Arc::new(AtomicBool::new(true));
        let r = Arc::clone(&running);
        ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))
            .context("failed to install Ctrl+C handler")?;

        let refresh = Duration::from_secs_f64(1.0 / self.fps.max(1e-3));
        while running.load(Ordering::SeqCst) {
            // 排空事件 channel，空闲事件转成告警日志
            while let Ok(event) = sub.events().try_recv() {
                if let TelemetryEvent::Idle { elapsed } = event {
                    tracing::warn!(elapsed_ms = elapsed.as_millis() as u64, "telemetry idle");
                }
            }

            render(cache.snapshot().as_deref());
            std::thread::sleep(refresh);
        }

        registry.unsubscribe(sub);
        println!("\n✅ monitor stopped");
        Ok(())
    }
}

/// 覆盖式渲染最新状态表格
fn render(frame: Option<&TelemetryFrame>) {
    // ANSI 清屏 + 光标回左上角
    print!("\x1b[2J\x1b[H");
    println!("ugo arm UDP monitor | Ctrl+C to exit");

    let Some(frame) = frame else {
        println!("last packet: (waiting...)");
        return;
    };
    println!("last packet: {:.2}s ago", frame.age_ms() as f64 / 1000.0);

    println!();
    println!(
        "{:>11} | {:>11} | {:>11} | {:>11}",
        "ID", "Angle[deg]", "Vel(raw)", "Cur(raw)"
    );
    println!("{}", "-".repeat(11 * 4 + 3 * 3));

    for &id in &frame.ids {
        let angle = frame.angle_deg(id).unwrap_or(f64::NAN);
        let vel = frame.velocity_raw(id).unwrap_or(0);
        let cur = frame.current_raw(id).unwrap_or(0);
        println!("{id:>11} | {angle:>11.1} | {vel:>11} | {cur:>11}");
    }

    use std::io::Write as _;
    let _ = std::io::stdout().flush();
}
