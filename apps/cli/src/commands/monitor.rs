//! 上传流监控
//!
//! 从上位机串口读取扫描头的上传数据，拆分为遥测记录与转发的舵机应答并打印。

use anyhow::Result;
use clap::Args;
use scanhead_protocol::{FrameView, HostFrame, HostStreamDecoder, RESPONSE_MAGIC, TelemetryFrame};
use scanhead_serial::{SerialError, SerialPortTransport, SerialTransport};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// 监控命令参数
#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 上位机串口
    #[arg(short, long)]
    pub port: String,

    /// 波特率
    #[arg(short, long, default_value_t = 115_200)]
    pub baud: u32,

    /// 每帧输出一行 JSON
    #[arg(long)]
    pub json: bool,
}

impl MonitorCommand {
    pub fn execute(&self) -> Result<()> {
        let mut transport = SerialPortTransport::open(&self.port, self.baud, Duration::from_millis(2))?;
        transport.set_receive_timeout(Duration::from_millis(100));

        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        })?;

        let mut decoder = HostStreamDecoder::new();
        while running.load(Ordering::SeqCst) {
            match transport.receive() {
                Ok(bytes) => {
                    decoder.push(&bytes);
                    while let Some(frame) = decoder.next_frame() {
                        println!("{}", render(&frame, self.json));
                    }
                },
                Err(SerialError::Timeout) => {},
                Err(e) => return Err(e.into()),
            }
        }

        if decoder.skipped_bytes() > 0 {
            eprintln!("跳过 {} 个无法识别的字节", decoder.skipped_bytes());
        }
        Ok(())
    }
}

/// 遥测帧转为 JSON
pub fn telemetry_json(frame: &TelemetryFrame) -> Value {
    json!({
        "type": "telemetry",
        "master": frame.master_frame,
        "sub": frame.sub_frame,
        "emitters": format!("{:03b}", frame.emitter_mask),
        "generic": frame.generic,
        "precision": frame.precision,
        "gain": frame.gain,
    })
}

/// 按输出格式渲染一帧
pub fn render(frame: &HostFrame, as_json: bool) -> String {
    match frame {
        HostFrame::Telemetry(telemetry) if as_json => telemetry_json(telemetry).to_string(),
        HostFrame::Telemetry(t) => format!(
            "📡 master={:>5} sub={:>5} emitters={:03b} precision={:?}",
            t.master_frame, t.sub_frame, t.emitter_mask, t.precision
        ),
        HostFrame::Actuator(bytes) => {
            let command = FrameView::parse(bytes, RESPONSE_MAGIC)
                .map(|view| view.command_id())
                .unwrap_or_default();
            if as_json {
                json!({
                    "type": "actuator",
                    "command": command,
                    "frame": hex::encode(bytes),
                })
                .to_string()
            } else {
                format!("🔁 actuator 0x{:02X}: {}", command, hex::encode(bytes))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanhead_protocol::{ActuatorCommand, encode_response};

    #[test]
    fn test_telemetry_json_fields() {
        let frame = TelemetryFrame {
            master_frame: 3,
            sub_frame: 7,
            emitter_mask: 0b011,
            ..TelemetryFrame::default()
        };
        let value = telemetry_json(&frame);
        assert_eq!(value["master"], 3);
        assert_eq!(value["sub"], 7);
        assert_eq!(value["emitters"], "011");
        assert_eq!(value["precision"].as_array().unwrap().len(), 8);
    }

    #[test]
    fn test_render_actuator_frame() {
        let frame = encode_response(ActuatorCommand::Ping, 1, &[]).unwrap();
        let text = render(&HostFrame::Actuator(frame.clone()), true);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "actuator");
        assert_eq!(value["command"], ActuatorCommand::Ping.as_u8());
        assert_eq!(value["frame"], hex::encode(&frame));
    }
}
