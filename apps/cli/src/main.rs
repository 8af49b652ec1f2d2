//! # Ugo CLI
//!
//! ugo 控制器的遥测调试工具。
//!
//! ## 两个子命令
//!
//! ### monitor（主机侧）
//!
//! ```bash
//! # 订阅 8886 端口，20Hz 刷新最新状态表格
//! ugo-cli monitor --port 8886 --fps 20
//! ```
//!
//! ### mock（控制器侧仿真）
//!
//! ```bash
//! # 等待 8888 端口上的触发包，然后以 100 包/秒回放合成遥测
//! ugo-cli mock --trigger-port 8888 --pps 100 --blank-rate 0.05
//! ```
//!
//! 两个命令对着跑就是一条无硬件的端到端链路：mock 模仿固件的
//! 输出排版（列对齐、周期抖动、空字段），monitor 走和生产代码
//! 相同的接收 / 解析路径。

use anyhow::Result;
use clap::{Parser, Subcommand};

mod mock;
mod monitor;

use mock::MockCommand;
use monitor::MonitorCommand;

/// Ugo CLI - 遥测监控与控制器仿真
#[derive(Parser, Debug)]
#[command(name = "ugo-cli")]
#[command(about = "Telemetry monitor and controller emulator for the ugo UDP bridge", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 实时遥测监控（最新状态表格）
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },

    /// 控制器仿真器（触发后回放合成遥测流）
    Mock {
        #[command(flatten)]
        args: MockCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ugo_cli=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Monitor { args } => args.execute(),
        Commands::Mock { args } => args.execute(),
    }
}
