//! 模拟运行
//!
//! 舵机链路接到内存模拟舵机，上位机链路接到本进程的解码打印线程。
//! 用于在没有硬件时观察各扫描模式的遥测输出。

use super::monitor::render;
use super::run::{build_head, load_config, serve};
use anyhow::{Result, anyhow};
use clap::{Args, ValueEnum};
use scanhead_driver::SimulatedServo;
use scanhead_protocol::{HostStreamDecoder, ModeMask};
use scanhead_serial::{MockTransport, SerialError, SerialTransport};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// 模拟的扫描模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SimMode {
    Idle,
    Debug,
    Continuous,
    Discrete,
}

impl SimMode {
    fn mode_bits(self) -> u16 {
        match self {
            SimMode::Idle => 0,
            SimMode::Debug => ModeMask::DEBUG_BIT,
            SimMode::Continuous => ModeMask::CONTINUOUS_BIT,
            SimMode::Discrete => ModeMask::DISCRETE_BIT,
        }
    }
}

/// 模拟命令参数
#[derive(Args, Debug)]
pub struct SimulateCommand {
    /// 配置文件（TOML），串口设置被忽略
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 扫描模式（覆盖配置中的模式位，保留发射管位）
    #[arg(short, long, value_enum)]
    pub mode: Option<SimMode>,

    /// 运行时长（秒），缺省时运行到 Ctrl+C
    #[arg(short, long)]
    pub seconds: Option<u64>,

    /// 每帧输出一行 JSON
    #[arg(long)]
    pub json: bool,
}

impl SimulateCommand {
    pub fn execute(&self) -> Result<()> {
        let mut config = load_config(self.config.as_ref())?;
        if let Some(mode) = self.mode {
            let emitters = config.params.mode_mask & ModeMask::EMITTER_BITS;
            config.params.mode_mask = emitters | mode.mode_bits();
        }
        config.validate()?;

        let (actuator, servo_end) = MockTransport::pair();
        let (host_link, host_end) = MockTransport::pair();
        let servo = SimulatedServo::spawn(servo_end, config.servo.id);
        servo.state().set_angle(config.params.low);

        let as_json = self.json;
        let printer = thread::Builder::new()
            .name("scanhead-sim-host".into())
            .spawn(move || print_stream(host_end, as_json))?;

        println!(
            "🤖 模拟舵机 #{}，模式掩码 {:#06x}",
            config.servo.id, config.params.mode_mask
        );
        let head = build_head(&config, actuator, host_link)?;
        serve(head, &config, self.seconds.map(Duration::from_secs))?;

        // 扫描头释放后上位机端断开，打印线程随之退出
        printer
            .join()
            .map_err(|_| anyhow!("打印线程异常退出"))?;
        println!(
            "✅ 模拟结束：舵机收到 {} 次运动、{} 次读角度",
            servo.state().moves(),
            servo.state().angle_reads()
        );
        Ok(())
    }
}

fn print_stream(mut host: MockTransport, as_json: bool) {
    host.set_receive_timeout(Duration::from_millis(100));
    let mut decoder = HostStreamDecoder::new();
    loop {
        match host.receive() {
            Ok(bytes) => {
                decoder.push(&bytes);
                while let Some(frame) = decoder.next_frame() {
                    println!("{}", render(&frame, as_json));
                }
            },
            Err(SerialError::Timeout) => {},
            Err(_) => break,
        }
    }
}
