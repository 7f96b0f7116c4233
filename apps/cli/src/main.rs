//! # Scan Head CLI
//!
//! 扫描头命令行工具。
//!
//! ```bash
//! # 在真实串口上运行扫描控制器
//! scanhead run --config scanhead.toml
//!
//! # 使用内存模拟舵机运行步进扫描，输出遥测
//! scanhead simulate --mode discrete --seconds 5
//!
//! # 向扫描头发送上位机命令
//! scanhead send --port /dev/ttyUSB1 set-mode 4
//!
//! # 解码上传数据流
//! scanhead monitor --port /dev/ttyUSB1 --json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{ConfigCommand, MonitorCommand, RunCommand, SendCommand, SimulateCommand};

/// Scan Head CLI - 旋转扫描头命令行工具
#[derive(Parser, Debug)]
#[command(name = "scanhead")]
#[command(about = "Command-line interface for the rotating scan head", long_about = None)]
#[command(version)]
struct Cli {
    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 在串口上运行扫描控制器与命令分发器
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 使用模拟舵机运行
    Simulate {
        #[command(flatten)]
        args: SimulateCommand,
    },

    /// 列出可用串口
    Ports,

    /// 发送一条上位机命令
    Send {
        #[command(flatten)]
        args: SendCommand,
    },

    /// 解码上传数据流
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },

    /// 配置文件管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("scanhead={default_level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run { args } => args.execute(),
        Commands::Simulate { args } => args.execute(),
        Commands::Ports => commands::ports::execute(),
        Commands::Send { args } => args.execute(),
        Commands::Monitor { args } => args.execute(),
        Commands::Config(cmd) => cmd.execute(),
    }
}
