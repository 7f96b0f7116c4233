//! 上位机管理命令帧
//!
//! ```text
//! [A0][B3][CmdId][fields…]
//! ```
//!
//! 参数类 16 位字段从偏移 3 开始依次排列，大端字节序。
//! 舵机透传命令（0x13-0x17）的舵机 ID、数据项为单字节；`ServoMove` 的角度和时间
//! 按舵机协议原样透传，使用小端字节序。

use crate::ids::{HOST_MAGIC, HostCommandId};
use crate::params::{ControlParams, PARAMS_BLOCK_LEN};
use crate::{ProtocolError, bytes_to_i16_be, bytes_to_u16_be, read_byte, read_pair};

/// 命令字段起始偏移
const FIELDS: usize = 3;

/// 上位机命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    /// 读取参数块
    ReadParams,
    /// 整体写入参数块
    WriteParams(ControlParams),
    SetUploadRate(u16),
    SetAdjustRate(u16),
    SetDwell(u16),
    SetPositions {
        low: i16,
        high: i16,
        step: i16,
        target: i16,
    },
    SetModeMask(u16),
    SetWarmup(u16),
    /// 增益总线读一个字节（`bus` 为地址表索引）
    GainRead {
        bus: u8,
    },
    /// 增益总线写两个字节
    GainWrite {
        bus: u8,
        data: [u8; 2],
    },
    ServoPing {
        servo_id: u8,
    },
    ServoMove {
        servo_id: u8,
        angle: i16,
        duration_ms: u16,
    },
    ServoReadAngle {
        servo_id: u8,
    },
    ServoDataRead {
        servo_id: u8,
        metric: u8,
    },
    ServoMonitor {
        servo_id: u8,
        metric: u8,
    },
    StartDebug {
        mode_mask: u16,
        target: i16,
        dwell_ms: u16,
    },
    StartContinuous {
        mode_mask: u16,
        low: i16,
        high: i16,
        dwell_ms: u16,
        warmup_ms: u16,
    },
    StartDiscrete {
        mode_mask: u16,
        low: i16,
        high: i16,
        step: i16,
        dwell_ms: u16,
        warmup_ms: u16,
    },
}

fn push_be(out: &mut Vec<u8>, values: &[i32]) {
    for value in values {
        out.extend_from_slice(&(*value as u16).to_be_bytes());
    }
}

fn be_u16(buf: &[u8], index: usize) -> Result<u16, ProtocolError> {
    read_pair(buf, FIELDS + index * 2).map(bytes_to_u16_be)
}

fn be_i16(buf: &[u8], index: usize) -> Result<i16, ProtocolError> {
    read_pair(buf, FIELDS + index * 2).map(bytes_to_i16_be)
}

impl HostCommand {
    pub fn id(&self) -> HostCommandId {
        match self {
            HostCommand::ReadParams => HostCommandId::ReadParams,
            HostCommand::WriteParams(_) => HostCommandId::WriteParams,
            HostCommand::SetUploadRate(_) => HostCommandId::SetUploadRate,
            HostCommand::SetAdjustRate(_) => HostCommandId::SetAdjustRate,
            HostCommand::SetDwell(_) => HostCommandId::SetDwell,
            HostCommand::SetPositions { .. } => HostCommandId::SetPositions,
            HostCommand::SetModeMask(_) => HostCommandId::SetModeMask,
            HostCommand::SetWarmup(_) => HostCommandId::SetWarmup,
            HostCommand::GainRead { .. } => HostCommandId::GainRead,
            HostCommand::GainWrite { .. } => HostCommandId::GainWrite,
            HostCommand::ServoPing { .. } => HostCommandId::ServoPing,
            HostCommand::ServoMove { .. } => HostCommandId::ServoMove,
            HostCommand::ServoReadAngle { .. } => HostCommandId::ServoReadAngle,
            HostCommand::ServoDataRead { .. } => HostCommandId::ServoDataRead,
            HostCommand::ServoMonitor { .. } => HostCommandId::ServoMonitor,
            HostCommand::StartDebug { .. } => HostCommandId::StartDebug,
            HostCommand::StartContinuous { .. } => HostCommandId::StartContinuous,
            HostCommand::StartDiscrete { .. } => HostCommandId::StartDiscrete,
        }
    }

    /// 该命令是否改写模式掩码（需要执行模式复位）
    pub fn rewrites_mode(&self) -> bool {
        matches!(
            self,
            HostCommand::WriteParams(_)
                | HostCommand::SetModeMask(_)
                | HostCommand::StartDebug { .. }
                | HostCommand::StartContinuous { .. }
                | HostCommand::StartDiscrete { .. }
        )
    }

    /// 解析命令帧
    ///
    /// # 错误
    ///
    /// - 帧头错误：`ProtocolError::InvalidMagic`
    /// - 未知命令：`ProtocolError::UnknownCommand`
    /// - 字段不完整：`ProtocolError::InvalidLength`
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        let magic = read_pair(buf, 0)?;
        if magic != HOST_MAGIC {
            return Err(ProtocolError::InvalidMagic {
                expected: HOST_MAGIC,
                actual: magic,
            });
        }
        let id = read_byte(buf, 2)?;
        let command = HostCommandId::try_from(id).map_err(|_| ProtocolError::UnknownCommand { id })?;
        let byte = |offset: usize| read_byte(buf, FIELDS + offset);

        let parsed = match command {
            HostCommandId::ReadParams => HostCommand::ReadParams,
            HostCommandId::WriteParams => {
                let block = buf.get(FIELDS..).unwrap_or_default();
                if block.len() < PARAMS_BLOCK_LEN {
                    return Err(ProtocolError::InvalidLength {
                        expected: FIELDS + PARAMS_BLOCK_LEN,
                        actual: buf.len(),
                    });
                }
                HostCommand::WriteParams(ControlParams::from_block(block)?)
            },
            HostCommandId::SetUploadRate => HostCommand::SetUploadRate(be_u16(buf, 0)?),
            HostCommandId::SetAdjustRate => HostCommand::SetAdjustRate(be_u16(buf, 0)?),
            HostCommandId::SetDwell => HostCommand::SetDwell(be_u16(buf, 0)?),
            HostCommandId::SetPositions => HostCommand::SetPositions {
                low: be_i16(buf, 0)?,
                high: be_i16(buf, 1)?,
                step: be_i16(buf, 2)?,
                target: be_i16(buf, 3)?,
            },
            HostCommandId::SetModeMask => HostCommand::SetModeMask(be_u16(buf, 0)?),
            HostCommandId::SetWarmup => HostCommand::SetWarmup(be_u16(buf, 0)?),
            HostCommandId::GainRead => HostCommand::GainRead { bus: byte(0)? },
            HostCommandId::GainWrite => HostCommand::GainWrite {
                bus: byte(0)?,
                data: [byte(1)?, byte(2)?],
            },
            HostCommandId::ServoPing => HostCommand::ServoPing { servo_id: byte(0)? },
            HostCommandId::ServoMove => HostCommand::ServoMove {
                servo_id: byte(0)?,
                angle: i16::from_le_bytes(read_pair(buf, FIELDS + 1)?),
                duration_ms: u16::from_le_bytes(read_pair(buf, FIELDS + 3)?),
            },
            HostCommandId::ServoReadAngle => HostCommand::ServoReadAngle { servo_id: byte(0)? },
            HostCommandId::ServoDataRead => HostCommand::ServoDataRead {
                servo_id: byte(0)?,
                metric: byte(1)?,
            },
            HostCommandId::ServoMonitor => HostCommand::ServoMonitor {
                servo_id: byte(0)?,
                metric: byte(1)?,
            },
            HostCommandId::StartDebug => HostCommand::StartDebug {
                mode_mask: be_u16(buf, 0)?,
                target: be_i16(buf, 1)?,
                dwell_ms: be_u16(buf, 2)?,
            },
            HostCommandId::StartContinuous => HostCommand::StartContinuous {
                mode_mask: be_u16(buf, 0)?,
                low: be_i16(buf, 1)?,
                high: be_i16(buf, 2)?,
                dwell_ms: be_u16(buf, 3)?,
                warmup_ms: be_u16(buf, 4)?,
            },
            HostCommandId::StartDiscrete => HostCommand::StartDiscrete {
                mode_mask: be_u16(buf, 0)?,
                low: be_i16(buf, 1)?,
                high: be_i16(buf, 2)?,
                step: be_i16(buf, 3)?,
                dwell_ms: be_u16(buf, 4)?,
                warmup_ms: be_u16(buf, 5)?,
            },
        };
        Ok(parsed)
    }

    /// 编码命令帧（上位机侧）
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FIELDS + PARAMS_BLOCK_LEN);
        out.extend_from_slice(&HOST_MAGIC);
        out.push(self.id().as_u8());

        match *self {
            HostCommand::ReadParams => {},
            HostCommand::WriteParams(params) => out.extend_from_slice(&params.to_block()),
            HostCommand::SetUploadRate(v)
            | HostCommand::SetAdjustRate(v)
            | HostCommand::SetDwell(v)
            | HostCommand::SetModeMask(v)
            | HostCommand::SetWarmup(v) => push_be(&mut out, &[v as i32]),
            HostCommand::SetPositions {
                low,
                high,
                step,
                target,
            } => push_be(&mut out, &[low as i32, high as i32, step as i32, target as i32]),
            HostCommand::GainRead { bus } => out.push(bus),
            HostCommand::GainWrite { bus, data } => {
                out.push(bus);
                out.extend_from_slice(&data);
            },
            HostCommand::ServoPing { servo_id } | HostCommand::ServoReadAngle { servo_id } => {
                out.push(servo_id)
            },
            HostCommand::ServoMove {
                servo_id,
                angle,
                duration_ms,
            } => {
                out.push(servo_id);
                out.extend_from_slice(&angle.to_le_bytes());
                out.extend_from_slice(&duration_ms.to_le_bytes());
            },
            HostCommand::ServoDataRead { servo_id, metric }
            | HostCommand::ServoMonitor { servo_id, metric } => {
                out.extend_from_slice(&[servo_id, metric])
            },
            HostCommand::StartDebug {
                mode_mask,
                target,
                dwell_ms,
            } => push_be(&mut out, &[mode_mask as i32, target as i32, dwell_ms as i32]),
            HostCommand::StartContinuous {
                mode_mask,
                low,
                high,
                dwell_ms,
                warmup_ms,
            } => push_be(&mut out, &[
                mode_mask as i32,
                low as i32,
                high as i32,
                dwell_ms as i32,
                warmup_ms as i32,
            ]),
            HostCommand::StartDiscrete {
                mode_mask,
                low,
                high,
                step,
                dwell_ms,
                warmup_ms,
            } => push_be(&mut out, &[
                mode_mask as i32,
                low as i32,
                high as i32,
                step as i32,
                dwell_ms as i32,
                warmup_ms as i32,
            ]),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_positions() {
        let buf = [0xA0, 0xB3, 0x06, 0x00, 0x00, 0x03, 0xE8, 0x00, 0x64, 0x01, 0xF4];
        assert_eq!(
            HostCommand::parse(&buf).unwrap(),
            HostCommand::SetPositions {
                low: 0,
                high: 1000,
                step: 100,
                target: 500
            }
        );
    }

    #[test]
    fn test_parse_start_continuous() {
        let buf = [
            0xA0, 0xB3, 0x22, 0x00, 0x32, 0x00, 0x00, 0x03, 0xE8, 0x00, 0x0A, 0x00, 0x05,
        ];
        let cmd = HostCommand::parse(&buf).unwrap();
        assert_eq!(
            cmd,
            HostCommand::StartContinuous {
                mode_mask: 0x32,
                low: 0,
                high: 1000,
                dwell_ms: 10,
                warmup_ms: 5
            }
        );
        assert!(cmd.rewrites_mode());
    }

    #[test]
    fn test_parse_servo_move_little_endian() {
        let buf = [0xA0, 0xB3, 0x14, 0x01, 0x84, 0x03, 0xE8, 0x03];
        assert_eq!(
            HostCommand::parse(&buf).unwrap(),
            HostCommand::ServoMove {
                servo_id: 1,
                angle: 900,
                duration_ms: 1000
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_magic() {
        assert!(matches!(
            HostCommand::parse(&[0xA0, 0xB4, 0x01]),
            Err(ProtocolError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn test_parse_unknown_id() {
        assert_eq!(
            HostCommand::parse(&[0xA0, 0xB3, 0x30]),
            Err(ProtocolError::UnknownCommand { id: 0x30 })
        );
    }

    #[test]
    fn test_parse_truncated() {
        assert!(matches!(
            HostCommand::parse(&[0xA0, 0xB3, 0x07, 0x00]),
            Err(ProtocolError::InvalidLength { .. })
        ));
        assert!(HostCommand::parse(&[0xA0, 0xB3, 0x02, 0x00]).is_err());
    }

    #[test]
    fn test_write_params_block() {
        let params = ControlParams {
            mode_mask: 0x0004,
            step: 25,
            ..Default::default()
        };
        let encoded = HostCommand::WriteParams(params).encode();
        assert_eq!(encoded.len(), 3 + 18);
        assert_eq!(
            HostCommand::parse(&encoded).unwrap(),
            HostCommand::WriteParams(params)
        );
    }

    #[test]
    fn test_encode_parse_every_command() {
        let commands = [
            HostCommand::ReadParams,
            HostCommand::SetUploadRate(50),
            HostCommand::SetAdjustRate(20),
            HostCommand::SetDwell(300),
            HostCommand::SetModeMask(0x0014),
            HostCommand::SetWarmup(15),
            HostCommand::GainRead { bus: 2 },
            HostCommand::GainWrite {
                bus: 1,
                data: [0x00, 0x80],
            },
            HostCommand::ServoPing { servo_id: 0 },
            HostCommand::ServoReadAngle { servo_id: 0 },
            HostCommand::ServoDataRead {
                servo_id: 0,
                metric: 1,
            },
            HostCommand::ServoMonitor {
                servo_id: 0,
                metric: 2,
            },
            HostCommand::StartDebug {
                mode_mask: 0x0071,
                target: -50,
                dwell_ms: 200,
            },
            HostCommand::StartDiscrete {
                mode_mask: 0x0004,
                low: 100,
                high: 900,
                step: 50,
                dwell_ms: 20,
                warmup_ms: 2,
            },
        ];
        for cmd in commands {
            assert_eq!(HostCommand::parse(&cmd.encode()).unwrap(), cmd, "{:?}", cmd);
        }
    }

    #[test]
    fn test_rewrites_mode() {
        assert!(HostCommand::SetModeMask(0).rewrites_mode());
        assert!(!HostCommand::SetDwell(10).rewrites_mode());
        assert!(!HostCommand::ReadParams.rewrites_mode());
    }
}
