//! 发送上位机命令
//!
//! 把命令编码为上位机命令帧写入串口，可选择等待并打印应答。

use super::monitor::render;
use anyhow::Result;
use clap::{Args, Subcommand};
use scanhead_protocol::{ControlParams, HostCommand, HostFrame, HostStreamDecoder};
use scanhead_serial::{SerialError, SerialPortTransport, SerialTransport};
use std::time::{Duration, Instant};

/// 发送命令参数
#[derive(Args, Debug)]
pub struct SendCommand {
    /// 上位机串口
    #[arg(short, long)]
    pub port: String,

    /// 波特率
    #[arg(short, long, default_value_t = 115_200)]
    pub baud: u32,

    /// 等待应答的时间（毫秒），0 表示不等待
    #[arg(long, default_value_t = 200)]
    pub wait_ms: u64,

    #[command(subcommand)]
    pub command: HostCommandArg,
}

/// 上位机命令
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum HostCommandArg {
    /// 读取参数块
    ReadParams,
    /// 设置上传频率（Hz）
    SetUploadRate { rate: u16 },
    /// 设置增益调节频率（Hz）
    SetAdjustRate { rate: u16 },
    /// 设置运动（驻留）时间（毫秒）
    SetDwell { ms: u16 },
    /// 设置发射管预热时间（毫秒）
    SetWarmup { ms: u16 },
    /// 设置扫描上下限、步长与 Debug 目标
    SetPositions {
        #[arg(allow_negative_numbers = true)]
        low: i16,
        #[arg(allow_negative_numbers = true)]
        high: i16,
        step: i16,
        #[arg(allow_negative_numbers = true)]
        target: i16,
    },
    /// 设置模式掩码
    SetMode { mask: u16 },
    /// 读增益
    GainRead { bus: u8 },
    /// 写增益
    GainWrite { bus: u8, high: u8, low: u8 },
    /// 舵机通讯检测
    Ping { servo: u8 },
    /// 舵机单圈角度控制（0.1°）
    Move {
        servo: u8,
        #[arg(allow_negative_numbers = true)]
        angle: i16,
        duration_ms: u16,
    },
    /// 读舵机角度
    ReadAngle { servo: u8 },
    /// 读舵机数据项
    DataRead { servo: u8, metric: u8 },
    /// 舵机数据监控
    Monitor { servo: u8, metric: u8 },
    /// 进入 Debug 模式
    StartDebug {
        mask: u16,
        #[arg(allow_negative_numbers = true)]
        target: i16,
        dwell_ms: u16,
    },
    /// 进入 Continuous 模式
    StartContinuous {
        mask: u16,
        #[arg(allow_negative_numbers = true)]
        low: i16,
        #[arg(allow_negative_numbers = true)]
        high: i16,
        dwell_ms: u16,
        warmup_ms: u16,
    },
    /// 进入 Discrete 模式
    StartDiscrete {
        mask: u16,
        #[arg(allow_negative_numbers = true)]
        low: i16,
        #[arg(allow_negative_numbers = true)]
        high: i16,
        step: i16,
        dwell_ms: u16,
        warmup_ms: u16,
    },
}

impl From<&HostCommandArg> for HostCommand {
    fn from(arg: &HostCommandArg) -> Self {
        match *arg {
            HostCommandArg::ReadParams => HostCommand::ReadParams,
            HostCommandArg::SetUploadRate { rate } => HostCommand::SetUploadRate(rate),
            HostCommandArg::SetAdjustRate { rate } => HostCommand::SetAdjustRate(rate),
            HostCommandArg::SetDwell { ms } => HostCommand::SetDwell(ms),
            HostCommandArg::SetWarmup { ms } => HostCommand::SetWarmup(ms),
            HostCommandArg::SetPositions {
                low,
                high,
                step,
                target,
            } => HostCommand::SetPositions {
                low,
                high,
                step,
                target,
            },
            HostCommandArg::SetMode { mask } => HostCommand::SetModeMask(mask),
            HostCommandArg::GainRead { bus } => HostCommand::GainRead { bus },
            HostCommandArg::GainWrite { bus, high, low } => HostCommand::GainWrite {
                bus,
                data: [high, low],
            },
            HostCommandArg::Ping { servo } => HostCommand::ServoPing { servo_id: servo },
            HostCommandArg::Move {
                servo,
                angle,
                duration_ms,
            } => HostCommand::ServoMove {
                servo_id: servo,
                angle,
                duration_ms,
            },
            HostCommandArg::ReadAngle { servo } => HostCommand::ServoReadAngle { servo_id: servo },
            HostCommandArg::DataRead { servo, metric } => HostCommand::ServoDataRead {
                servo_id: servo,
                metric,
            },
            HostCommandArg::Monitor { servo, metric } => HostCommand::ServoMonitor {
                servo_id: servo,
                metric,
            },
            HostCommandArg::StartDebug {
                mask,
                target,
                dwell_ms,
            } => HostCommand::StartDebug {
                mode_mask: mask,
                target,
                dwell_ms,
            },
            HostCommandArg::StartContinuous {
                mask,
                low,
                high,
                dwell_ms,
                warmup_ms,
            } => HostCommand::StartContinuous {
                mode_mask: mask,
                low,
                high,
                dwell_ms,
                warmup_ms,
            },
            HostCommandArg::StartDiscrete {
                mask,
                low,
                high,
                step,
                dwell_ms,
                warmup_ms,
            } => HostCommand::StartDiscrete {
                mode_mask: mask,
                low,
                high,
                step,
                dwell_ms,
                warmup_ms,
            },
        }
    }
}

impl SendCommand {
    pub fn execute(&self) -> Result<()> {
        let command = HostCommand::from(&self.command);
        let frame = command.encode();

        let mut transport = SerialPortTransport::open(&self.port, self.baud, Duration::from_millis(2))?;
        transport.send(&frame)?;
        println!("📤 {:?}: {}", command.id(), hex::encode(&frame));

        if self.wait_ms == 0 {
            return Ok(());
        }
        let reply = collect_reply(&mut transport, Duration::from_millis(self.wait_ms))?;
        if reply.is_empty() {
            println!("(无应答)");
            return Ok(());
        }

        match command {
            HostCommand::ReadParams => match ControlParams::from_block(&reply) {
                Ok(params) => println!("📥 {:#?}", params),
                Err(e) => println!("📥 {} ({})", hex::encode(&reply), e),
            },
            HostCommand::GainRead { .. } => println!("📥 gain = 0x{:02X}", reply[0]),
            _ => print_frames(&reply),
        }
        Ok(())
    }
}

/// 收集等待时间内的全部应答字节
fn collect_reply(transport: &mut impl SerialTransport, wait: Duration) -> Result<Vec<u8>> {
    transport.set_receive_timeout(Duration::from_millis(10));
    let deadline = Instant::now() + wait;
    let mut reply = Vec::new();
    while Instant::now() < deadline {
        match transport.receive() {
            Ok(bytes) => reply.extend_from_slice(&bytes),
            Err(SerialError::Timeout) => {},
            Err(e) => return Err(e.into()),
        }
    }
    Ok(reply)
}

fn print_frames(reply: &[u8]) {
    let mut decoder = HostStreamDecoder::new();
    decoder.push(reply);
    let mut decoded = 0;
    while let Some(frame) = decoder.next_frame() {
        if matches!(frame, HostFrame::Actuator(_)) {
            decoded += 1;
        }
        println!("📥 {}", render(&frame, false));
    }
    if decoded == 0 {
        println!("📥 {}", hex::encode(reply));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Harness {
        #[command(subcommand)]
        command: HostCommandArg,
    }

    fn parse(args: &[&str]) -> HostCommand {
        let harness = Harness::try_parse_from(std::iter::once("send").chain(args.iter().copied()))
            .unwrap();
        HostCommand::from(&harness.command)
    }

    #[test]
    fn test_parse_start_discrete() {
        assert_eq!(
            parse(&["start-discrete", "4", "-300", "300", "50", "200", "10"]),
            HostCommand::StartDiscrete {
                mode_mask: 4,
                low: -300,
                high: 300,
                step: 50,
                dwell_ms: 200,
                warmup_ms: 10,
            }
        );
    }

    #[test]
    fn test_parse_gain_write() {
        assert_eq!(
            parse(&["gain-write", "2", "0", "127"]),
            HostCommand::GainWrite {
                bus: 2,
                data: [0, 127],
            }
        );
    }

    #[test]
    fn test_encoded_frame_parses_back() {
        let command = parse(&["move", "1", "-450", "100"]);
        assert_eq!(HostCommand::parse(&command.encode()).unwrap(), command);
    }
}
