//! 运行命令
//!
//! 打开舵机串口与上位机串口，前台运行扫描控制器，后台线程分发上位机命令。

use anyhow::{Context, Result, anyhow};
use clap::Args;
use scanhead_control::{CommandDispatcher, ScanController, ScanHeadConfig};
use scanhead_driver::{ScanHead, ScanHeadBuilder};
use scanhead_serial::{SerialPortTransport, SerialTransport};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::info;

/// 运行命令参数
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 配置文件（TOML）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 舵机串口（覆盖配置）
    #[arg(long)]
    pub actuator_port: Option<String>,

    /// 上位机串口（覆盖配置）
    #[arg(long)]
    pub host_port: Option<String>,

    /// 波特率（覆盖配置）
    #[arg(short, long)]
    pub baud: Option<u32>,
}

/// 加载配置文件，未指定时使用默认配置
pub fn load_config(path: Option<&PathBuf>) -> Result<ScanHeadConfig> {
    match path {
        Some(path) => ScanHeadConfig::load(path)
            .with_context(|| format!("加载配置文件失败: {}", path.display())),
        None => Ok(ScanHeadConfig::default()),
    }
}

impl RunCommand {
    /// 合并配置文件与命令行参数（命令行参数优先）
    pub fn resolve(&self) -> Result<ScanHeadConfig> {
        let mut config = load_config(self.config.as_ref())?;
        if let Some(port) = &self.actuator_port {
            config.link.actuator_port = Some(port.clone());
        }
        if let Some(port) = &self.host_port {
            config.link.host_port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.link.baud_rate = baud;
        }
        Ok(config)
    }

    pub fn execute(&self) -> Result<()> {
        let config = self.resolve()?;
        let idle_gap = Duration::from_millis(config.link.receive_idle_ms);

        let actuator_path = config
            .link
            .actuator_port
            .as_deref()
            .ok_or_else(|| anyhow!("未配置舵机串口（--actuator-port 或 [link].actuator_port）"))?;
        let host_path = config
            .link
            .host_port
            .as_deref()
            .ok_or_else(|| anyhow!("未配置上位机串口（--host-port 或 [link].host_port）"))?;

        println!("🔌 打开舵机串口 {} @ {}", actuator_path, config.link.baud_rate);
        let actuator = SerialPortTransport::open(actuator_path, config.link.baud_rate, idle_gap)?;
        println!("🔌 打开上位机串口 {} @ {}", host_path, config.link.baud_rate);
        let host = SerialPortTransport::open(host_path, config.link.baud_rate, idle_gap)?;

        let head = build_head(&config, actuator, host)?;
        serve(head, &config, None)
    }
}

/// 按配置组装扫描头
pub fn build_head(
    config: &ScanHeadConfig,
    actuator: impl SerialTransport + Send + 'static,
    host: impl SerialTransport + Send + 'static,
) -> Result<Arc<ScanHead>> {
    let head = ScanHeadBuilder::new()
        .servo_id(config.servo.id)
        .params(config.params)
        .link_config(config.link_config())
        .pipeline_config(config.pipeline_config())
        .gain_addresses(config.gain.bus_addresses)
        .build(actuator, host)?;
    Ok(Arc::new(head))
}

/// 运行控制器与分发器，直到 Ctrl+C、IO 线程退出或达到时限
pub fn serve(head: Arc<ScanHead>, config: &ScanHeadConfig, limit: Option<Duration>) -> Result<()> {
    let mut controller = ScanController::new(head.clone(), config.controller_config());
    let stop = controller.stop_handle();

    let signal_stop = stop.clone();
    ctrlc::set_handler(move || {
        signal_stop.store(true, Ordering::Release);
        println!("\n收到退出信号，正在关闭...");
    })?;

    if let Some(limit) = limit {
        let timer_stop = stop.clone();
        thread::spawn(move || {
            thread::sleep(limit);
            timer_stop.store(true, Ordering::Release);
        });
    }

    let dispatcher = CommandDispatcher::new(head.clone());
    let dispatcher_stop: Arc<AtomicBool> = stop.clone();
    let dispatcher_thread = thread::Builder::new()
        .name("scanhead-dispatch".into())
        .spawn(move || dispatcher.run(&dispatcher_stop))?;

    controller.run();
    stop.store(true, Ordering::Release);
    dispatcher_thread
        .join()
        .map_err(|_| anyhow!("命令分发线程异常退出"))?;

    let metrics = head.metrics();
    info!(
        "Actuator frames tx={} rx={}, telemetry frames={}, host commands={}",
        metrics.actuator_tx_frames,
        metrics.actuator_rx_frames,
        metrics.telemetry_frames,
        metrics.host_commands
    );
    Ok(())
}
