//! 遥测记录（40 字节上传帧）
//!
//! 布局（小端字节序）：
//!
//! | 偏移 | 内容 |
//! |---|---|
//! | 0-1 | 同步字 `A9 B5` |
//! | 2-9 | 4 路通用 ADC 通道（u16） |
//! | 10-25 | 8 路精密通道（i16） |
//! | 26-33 | 8 路增益档位（u8） |
//! | 34-35 | 主帧号（u16） |
//! | 36-37 | 子帧号（u16） |
//! | 38 | 发射管掩码 |
//! | 39 | 结束同步字 `33` |

use crate::ids::{TELEMETRY_SYNC_HEAD, TELEMETRY_SYNC_TAIL};
use crate::schema::{self, Endian, FieldKind, FieldSpec, Record};
use crate::ProtocolError;

/// 遥测记录长度
pub const TELEMETRY_FRAME_LEN: usize = schema::schema_len(TelemetryFrame::SCHEMA);

/// 遥测记录字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryField {
    SyncHead,
    Generic,
    Precision,
    Gain,
    MasterFrame,
    SubFrame,
    EmitterMask,
    SyncTail,
}

/// 遥测记录
///
/// 每次上传时重新构建，不持有任何持久状态。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetryFrame {
    /// 通用 ADC 通道
    pub generic: [u16; 4],
    /// 精密（Σ-Δ）通道
    pub precision: [i16; 8],
    /// 增益档位
    pub gain: [u8; 8],
    pub master_frame: u16,
    pub sub_frame: u16,
    /// 当前点亮的发射管掩码
    pub emitter_mask: u8,
}

impl Record for TelemetryFrame {
    type Field = TelemetryField;

    const SCHEMA: &'static [FieldSpec<TelemetryField>] = &[
        FieldSpec::new(
            TelemetryField::SyncHead,
            FieldKind::Const(&TELEMETRY_SYNC_HEAD),
            1,
        ),
        FieldSpec::new(TelemetryField::Generic, FieldKind::U16(Endian::Little), 4),
        FieldSpec::new(TelemetryField::Precision, FieldKind::I16(Endian::Little), 8),
        FieldSpec::new(TelemetryField::Gain, FieldKind::U8, 8),
        FieldSpec::new(TelemetryField::MasterFrame, FieldKind::U16(Endian::Little), 1),
        FieldSpec::new(TelemetryField::SubFrame, FieldKind::U16(Endian::Little), 1),
        FieldSpec::new(TelemetryField::EmitterMask, FieldKind::U8, 1),
        FieldSpec::new(
            TelemetryField::SyncTail,
            FieldKind::Const(&[TELEMETRY_SYNC_TAIL]),
            1,
        ),
    ];

    fn get(&self, field: TelemetryField, index: usize) -> i32 {
        match field {
            TelemetryField::SyncHead | TelemetryField::SyncTail => 0,
            TelemetryField::Generic => self.generic[index] as i32,
            TelemetryField::Precision => self.precision[index] as i32,
            TelemetryField::Gain => self.gain[index] as i32,
            TelemetryField::MasterFrame => self.master_frame as i32,
            TelemetryField::SubFrame => self.sub_frame as i32,
            TelemetryField::EmitterMask => self.emitter_mask as i32,
        }
    }

    fn set(&mut self, field: TelemetryField, index: usize, value: i32) {
        match field {
            TelemetryField::SyncHead | TelemetryField::SyncTail => {},
            TelemetryField::Generic => self.generic[index] = value as u16,
            TelemetryField::Precision => self.precision[index] = value as i16,
            TelemetryField::Gain => self.gain[index] = value as u8,
            TelemetryField::MasterFrame => self.master_frame = value as u16,
            TelemetryField::SubFrame => self.sub_frame = value as u16,
            TelemetryField::EmitterMask => self.emitter_mask = value as u8,
        }
    }
}

impl TelemetryFrame {
    /// 编码为 40 字节上传记录
    pub fn to_bytes(&self) -> [u8; TELEMETRY_FRAME_LEN] {
        let mut buf = [0u8; TELEMETRY_FRAME_LEN];
        // 缓冲区长度与字段表一致，编码不会失败
        let _ = schema::encode_into(self, &mut buf);
        buf
    }
}

impl TryFrom<&[u8]> for TelemetryFrame {
    type Error = ProtocolError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != TELEMETRY_FRAME_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: TELEMETRY_FRAME_LEN,
                actual: bytes.len(),
            });
        }
        schema::decode_from(bytes)
    }
}
