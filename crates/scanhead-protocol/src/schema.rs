//! 定长记录字段表
//!
//! 遥测记录与参数块都是固定偏移的二进制布局。这里用一张有序字段表描述布局
//! （字段、宽度、字节序、重复次数），所有偏移由字段表推导，编码和解码各只有一份实现。
//!
//! ```rust
//! use scanhead_protocol::schema::{self, Record};
//! use scanhead_protocol::TelemetryFrame;
//!
//! let frame = TelemetryFrame::default();
//! let mut buf = [0u8; 40];
//! schema::encode_into(&frame, &mut buf).unwrap();
//! let back: TelemetryFrame = schema::decode_from(&buf).unwrap();
//! assert_eq!(back, frame);
//! ```

use crate::ProtocolError;
use std::fmt::Debug;

/// 字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// 字段的标量类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// 固定字节（同步字）：编码时写入，解码时校验
    Const(&'static [u8]),
    U8,
    U16(Endian),
    I16(Endian),
}

impl FieldKind {
    /// 单个元素的字节宽度
    pub const fn width(&self) -> usize {
        match self {
            FieldKind::Const(bytes) => bytes.len(),
            FieldKind::U8 => 1,
            FieldKind::U16(_) | FieldKind::I16(_) => 2,
        }
    }
}

/// 字段表中的一项
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec<F> {
    pub field: F,
    pub kind: FieldKind,
    /// 元素个数（数组字段 > 1）
    pub count: usize,
}

impl<F> FieldSpec<F> {
    pub const fn new(field: F, kind: FieldKind, count: usize) -> Self {
        Self { field, kind, count }
    }

    /// 字段占用的总字节数
    pub const fn width(&self) -> usize {
        self.kind.width() * self.count
    }
}

/// 由字段表描述的定长记录
///
/// 值统一以 `i32` 传递，按字段类型截断写入。
pub trait Record: Default {
    type Field: Copy + PartialEq + Debug + 'static;

    /// 有序字段表
    const SCHEMA: &'static [FieldSpec<Self::Field>];

    fn get(&self, field: Self::Field, index: usize) -> i32;

    fn set(&mut self, field: Self::Field, index: usize, value: i32);
}

/// 字段表描述的记录总长度
pub const fn schema_len<F>(schema: &[FieldSpec<F>]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < schema.len() {
        total += schema[i].width();
        i += 1;
    }
    total
}

/// 字段在记录中的起始偏移
pub fn offset_of<R: Record>(field: R::Field) -> Option<usize> {
    let mut offset = 0;
    for spec in R::SCHEMA {
        if spec.field == field {
            return Some(offset);
        }
        offset += spec.width();
    }
    None
}

/// 按字段表编码记录
///
/// # 返回
///
/// 写入的字节数（即记录长度）
///
/// # 错误
///
/// `out` 长度不足时返回 `ProtocolError::InvalidLength`。
pub fn encode_into<R: Record>(record: &R, out: &mut [u8]) -> Result<usize, ProtocolError> {
    let len = schema_len(R::SCHEMA);
    if out.len() < len {
        return Err(ProtocolError::InvalidLength {
            expected: len,
            actual: out.len(),
        });
    }

    let mut offset = 0;
    for spec in R::SCHEMA {
        let width = spec.kind.width();
        for index in 0..spec.count {
            let slot = &mut out[offset..offset + width];
            match spec.kind {
                FieldKind::Const(bytes) => slot.copy_from_slice(bytes),
                FieldKind::U8 => slot[0] = record.get(spec.field, index) as u8,
                FieldKind::U16(endian) => {
                    let value = record.get(spec.field, index) as u16;
                    slot.copy_from_slice(&match endian {
                        Endian::Little => value.to_le_bytes(),
                        Endian::Big => value.to_be_bytes(),
                    });
                },
                FieldKind::I16(endian) => {
                    let value = record.get(spec.field, index) as i16;
                    slot.copy_from_slice(&match endian {
                        Endian::Little => value.to_le_bytes(),
                        Endian::Big => value.to_be_bytes(),
                    });
                },
            }
            offset += width;
        }
    }
    Ok(len)
}

/// 按字段表解码记录
///
/// # 错误
///
/// - 长度不足：`ProtocolError::InvalidLength`
/// - 同步字不匹配：`ProtocolError::InvalidValue`
pub fn decode_from<R: Record>(bytes: &[u8]) -> Result<R, ProtocolError> {
    let len = schema_len(R::SCHEMA);
    if bytes.len() < len {
        return Err(ProtocolError::InvalidLength {
            expected: len,
            actual: bytes.len(),
        });
    }

    let mut record = R::default();
    let mut offset = 0;
    for spec in R::SCHEMA {
        let width = spec.kind.width();
        for index in 0..spec.count {
            let slot = &bytes[offset..offset + width];
            match spec.kind {
                FieldKind::Const(expected) => {
                    if let Some(pos) = slot.iter().zip(expected).position(|(a, b)| a != b) {
                        return Err(ProtocolError::InvalidValue {
                            field: format!("{:?}", spec.field),
                            value: slot[pos] as u16,
                        });
                    }
                },
                FieldKind::U8 => record.set(spec.field, index, slot[0] as i32),
                FieldKind::U16(endian) => {
                    let pair = [slot[0], slot[1]];
                    let value = match endian {
                        Endian::Little => u16::from_le_bytes(pair),
                        Endian::Big => u16::from_be_bytes(pair),
                    };
                    record.set(spec.field, index, value as i32);
                },
                FieldKind::I16(endian) => {
                    let pair = [slot[0], slot[1]];
                    let value = match endian {
                        Endian::Little => i16::from_le_bytes(pair),
                        Endian::Big => i16::from_be_bytes(pair),
                    };
                    record.set(spec.field, index, value as i32);
                },
            }
            offset += width;
        }
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Field {
        Sync,
        Pair,
        Signed,
    }

    #[derive(Debug, Default, PartialEq)]
    struct Sample {
        pair: [u16; 2],
        signed: i16,
    }

    impl Record for Sample {
        type Field = Field;
        const SCHEMA: &'static [FieldSpec<Field>] = &[
            FieldSpec::new(Field::Sync, FieldKind::Const(&[0xAA]), 1),
            FieldSpec::new(Field::Pair, FieldKind::U16(Endian::Big), 2),
            FieldSpec::new(Field::Signed, FieldKind::I16(Endian::Little), 1),
        ];

        fn get(&self, field: Field, index: usize) -> i32 {
            match field {
                Field::Sync => 0,
                Field::Pair => self.pair[index] as i32,
                Field::Signed => self.signed as i32,
            }
        }

        fn set(&mut self, field: Field, index: usize, value: i32) {
            match field {
                Field::Sync => {},
                Field::Pair => self.pair[index] = value as u16,
                Field::Signed => self.signed = value as i16,
            }
        }
    }

    #[test]
    fn test_schema_len_and_offsets() {
        assert_eq!(schema_len(Sample::SCHEMA), 7);
        assert_eq!(offset_of::<Sample>(Field::Sync), Some(0));
        assert_eq!(offset_of::<Sample>(Field::Pair), Some(1));
        assert_eq!(offset_of::<Sample>(Field::Signed), Some(5));
    }

    #[test]
    fn test_encode_layout() {
        let sample = Sample {
            pair: [0x0102, 0x0304],
            signed: -2,
        };
        let mut buf = [0u8; 7];
        assert_eq!(encode_into(&sample, &mut buf).unwrap(), 7);
        assert_eq!(buf, [0xAA, 0x01, 0x02, 0x03, 0x04, 0xFE, 0xFF]);
        assert_eq!(decode_from::<Sample>(&buf).unwrap(), sample);
    }

    #[test]
    fn test_decode_rejects_bad_sync() {
        let buf = [0xAB, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            decode_from::<Sample>(&buf),
            Err(ProtocolError::InvalidValue { value: 0xAB, .. })
        ));
    }

    #[test]
    fn test_short_buffers() {
        let mut buf = [0u8; 6];
        assert!(encode_into(&Sample::default(), &mut buf).is_err());
        assert!(matches!(
            decode_from::<Sample>(&buf),
            Err(ProtocolError::InvalidLength {
                expected: 7,
                actual: 6
            })
        ));
    }
}
