//! 舵机协议帧编解码
//!
//! 帧格式（字段为小端字节序）：
//!
//! ```text
//! [H1][H2][CmdId][Len][ServoId][payload…][Checksum]
//! ```
//!
//! - 请求帧头 `12 4C`，应答帧头 `05 1C`
//! - `Len` = 1（舵机 ID）+ 载荷长度
//! - `Checksum` = 之前所有字节之和的低 8 位

use crate::ids::*;
use crate::{ProtocolError, read_byte, read_pair};
use smallvec::SmallVec;

/// 舵机帧字节（请求帧与应答帧共用，不超过 [`MAX_RESPONSE_LEN`] 时栈上分配）
pub type FrameBytes = SmallVec<[u8; 64]>;

/// 单圈角度控制应答中表示成功的状态字节
pub const MOVE_STATUS_SUCCESS: u8 = 0x01;

/// 计算校验和：所有字节之和的低 8 位
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// 编码请求帧
///
/// # 参数
///
/// - `cmd`: 命令 ID
/// - `servo_id`: 舵机 ID（载荷第一个字节）
/// - `payload`: 舵机 ID 之后的载荷
///
/// # 错误
///
/// 帧总长超过 [`MAX_FRAME_LEN`] 时返回 `ProtocolError::PayloadTooLong`。
pub fn encode(
    cmd: ActuatorCommand,
    servo_id: u8,
    payload: &[u8],
) -> Result<FrameBytes, ProtocolError> {
    let max = MAX_FRAME_LEN - FRAME_OVERHEAD - 1;
    if payload.len() > max {
        return Err(ProtocolError::PayloadTooLong {
            len: payload.len(),
            max,
        });
    }
    Ok(build_frame(REQUEST_MAGIC, cmd.as_u8(), servo_id, payload))
}

/// 组帧（调用方保证长度合法）
fn build_frame(magic: [u8; 2], cmd: u8, servo_id: u8, payload: &[u8]) -> FrameBytes {
    let mut frame = FrameBytes::new();
    frame.extend_from_slice(&magic);
    frame.push(cmd);
    frame.push((1 + payload.len()) as u8);
    frame.push(servo_id);
    frame.extend_from_slice(payload);
    let sum = checksum(&frame);
    frame.push(sum);
    frame
}

/// 舵机请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorRequest {
    Ping {
        servo_id: u8,
    },
    ReadAngle {
        servo_id: u8,
    },
    /// 单圈角度控制（功率字段保留为 0）
    Move {
        servo_id: u8,
        angle: i16,
        duration_ms: u16,
    },
    DataRead {
        servo_id: u8,
        metric: u8,
    },
    Monitor {
        servo_id: u8,
        metric: u8,
    },
}

impl ActuatorRequest {
    pub fn command(&self) -> ActuatorCommand {
        match self {
            ActuatorRequest::Ping { .. } => ActuatorCommand::Ping,
            ActuatorRequest::ReadAngle { .. } => ActuatorCommand::ReadAngle,
            ActuatorRequest::Move { .. } => ActuatorCommand::SingleAngleMove,
            ActuatorRequest::DataRead { .. } => ActuatorCommand::DataRead,
            ActuatorRequest::Monitor { .. } => ActuatorCommand::DataMonitor,
        }
    }

    pub fn servo_id(&self) -> u8 {
        match *self {
            ActuatorRequest::Ping { servo_id }
            | ActuatorRequest::ReadAngle { servo_id }
            | ActuatorRequest::Move { servo_id, .. }
            | ActuatorRequest::DataRead { servo_id, .. }
            | ActuatorRequest::Monitor { servo_id, .. } => servo_id,
        }
    }

    /// 构建请求帧
    pub fn to_frame(&self) -> FrameBytes {
        let cmd = self.command().as_u8();
        let id = self.servo_id();
        match *self {
            ActuatorRequest::Ping { .. } | ActuatorRequest::ReadAngle { .. } => {
                build_frame(REQUEST_MAGIC, cmd, id, &[])
            },
            ActuatorRequest::Move {
                angle, duration_ms, ..
            } => {
                let mut payload = [0u8; 6];
                payload[0..2].copy_from_slice(&angle.to_le_bytes());
                payload[2..4].copy_from_slice(&duration_ms.to_le_bytes());
                // payload[4..6]: 功率，保留 0
                build_frame(REQUEST_MAGIC, cmd, id, &payload)
            },
            ActuatorRequest::DataRead { metric, .. } | ActuatorRequest::Monitor { metric, .. } => {
                build_frame(REQUEST_MAGIC, cmd, id, &[metric])
            },
        }
    }
}

/// 帧的只读视图
///
/// 只校验帧头；长度、载荷按需访问。
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    bytes: &'a [u8],
}

impl<'a> FrameView<'a> {
    /// 校验帧头并创建视图
    ///
    /// # 错误
    ///
    /// - 不足 4 字节：`ProtocolError::InvalidLength`
    /// - 帧头不匹配：`ProtocolError::InvalidMagic`
    pub fn parse(bytes: &'a [u8], magic: [u8; 2]) -> Result<Self, ProtocolError> {
        if bytes.len() < 4 {
            return Err(ProtocolError::InvalidLength {
                expected: 4,
                actual: bytes.len(),
            });
        }
        let actual = [bytes[0], bytes[1]];
        if actual != magic {
            return Err(ProtocolError::InvalidMagic {
                expected: magic,
                actual,
            });
        }
        Ok(Self { bytes })
    }

    pub fn command_id(&self) -> u8 {
        self.bytes[2]
    }

    /// 帧中声明的长度字段
    pub fn declared_len(&self) -> u8 {
        self.bytes[3]
    }

    /// 按长度字段计算的完整帧长
    pub fn frame_len(&self) -> usize {
        FRAME_OVERHEAD + self.declared_len() as usize
    }

    /// 帧字节（按声明长度截取，不超过实际收到的字节）
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.bytes[..self.frame_len().min(self.bytes.len())]
    }

    /// 载荷（含舵机 ID）
    pub fn payload(&self) -> &'a [u8] {
        let end = (4 + self.declared_len() as usize).min(self.bytes.len());
        &self.bytes[4..end]
    }

    pub fn payload_byte(&self, offset: usize) -> Result<u8, ProtocolError> {
        read_byte(self.payload(), offset)
    }

    pub fn payload_i16_le(&self, offset: usize) -> Result<i16, ProtocolError> {
        read_pair(self.payload(), offset).map(i16::from_le_bytes)
    }

    /// 帧尾携带的校验和
    pub fn checksum(&self) -> Result<u8, ProtocolError> {
        read_byte(self.bytes, self.frame_len() - 1)
    }

    /// 校验和检查
    ///
    /// # 错误
    ///
    /// - 帧不完整：`ProtocolError::InvalidLength`
    /// - 校验和不一致：`ProtocolError::ChecksumMismatch`
    pub fn verify_checksum(&self) -> Result<(), ProtocolError> {
        let carried = self.checksum()?;
        let computed = checksum(&self.bytes[..self.frame_len() - 1]);
        if carried != computed {
            return Err(ProtocolError::ChecksumMismatch {
                expected: computed,
                actual: carried,
            });
        }
        Ok(())
    }
}

/// 应答帧校验和策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum ChecksumPolicy {
    /// 不检查应答帧校验和（舵机端的既有行为）
    #[default]
    Lenient,
    /// 校验和不一致的应答帧被丢弃
    Strict,
}

/// 应答帧解码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorEvent {
    /// 读角度应答：更新最近角度并释放完成令牌
    AngleReport { servo_id: u8, angle: i16 },
    /// 单圈角度控制应答：仅当 `success` 时释放完成令牌
    MoveAck { servo_id: u8, success: bool },
    /// 原样转发给上位机的应答（通讯检测、读数据、数据监控）
    Relay {
        command: ActuatorCommand,
        frame: FrameBytes,
    },
}

/// 解码一个应答帧
///
/// # 错误
///
/// 帧头错误、未知命令、长度不足、（严格模式下）校验和错误都返回 `Err`。
/// 调用方负责静默丢弃，这些错误不会上报上位机。
pub fn decode(buffer: &[u8], policy: ChecksumPolicy) -> Result<ActuatorEvent, ProtocolError> {
    let view = FrameView::parse(buffer, RESPONSE_MAGIC)?;
    if policy == ChecksumPolicy::Strict {
        view.verify_checksum()?;
    }

    let id = view.command_id();
    let command =
        ActuatorCommand::try_from(id).map_err(|_| ProtocolError::UnknownCommand { id })?;
    let servo_id = view.payload_byte(0)?;

    match command {
        ActuatorCommand::ReadAngle => Ok(ActuatorEvent::AngleReport {
            servo_id,
            angle: view.payload_i16_le(1)?,
        }),
        ActuatorCommand::SingleAngleMove => Ok(ActuatorEvent::MoveAck {
            servo_id,
            success: view.payload_byte(1)? == MOVE_STATUS_SUCCESS,
        }),
        ActuatorCommand::Ping | ActuatorCommand::DataRead | ActuatorCommand::DataMonitor => {
            Ok(ActuatorEvent::Relay {
                command,
                frame: FrameBytes::from_slice(view.as_bytes()),
            })
        },
    }
}

/// 构建应答帧（用于模拟舵机与测试）
///
/// 帧总长超过 [`MAX_RESPONSE_LEN`] 时返回 `ProtocolError::PayloadTooLong`。
pub fn encode_response(
    cmd: ActuatorCommand,
    servo_id: u8,
    payload: &[u8],
) -> Result<FrameBytes, ProtocolError> {
    let max = MAX_RESPONSE_LEN - FRAME_OVERHEAD - 1;
    if payload.len() > max {
        return Err(ProtocolError::PayloadTooLong {
            len: payload.len(),
            max,
        });
    }
    Ok(build_frame(RESPONSE_MAGIC, cmd.as_u8(), servo_id, payload))
}
