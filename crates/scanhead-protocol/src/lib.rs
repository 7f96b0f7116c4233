//! # Scan Head Protocol
//!
//! 扫描头串口协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 帧头魔数与命令 ID 常量
//! - `schema`: 定长记录的字段表（字段顺序、宽度、字节序）
//! - `actuator`: 舵机请求帧编码、应答帧解码、校验和
//! - `stream`: 字节流重组（舵机应答流、上位机上传流）
//! - `telemetry`: 40 字节遥测记录
//! - `host`: 上位机管理命令帧
//! - `mode`: 模式掩码位域
//! - `params`: 运行参数 `ControlParams`
//!
//! ## 字节序
//!
//! 舵机协议和遥测记录使用小端字节序；上位机命令帧的 16 位字段使用大端字节序。

pub mod actuator;
pub mod host;
pub mod ids;
pub mod mode;
pub mod params;
pub mod schema;
pub mod stream;
pub mod telemetry;

// 重新导出常用类型
pub use actuator::*;
pub use host::*;
pub use ids::*;
pub use mode::*;
pub use params::*;
pub use stream::*;
pub use telemetry::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid magic: expected {expected:02X?}, got {actual:02X?}")]
    InvalidMagic { expected: [u8; 2], actual: [u8; 2] },

    #[error("Checksum mismatch: computed 0x{expected:02X}, frame carries 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Unknown command id: 0x{id:02X}")]
    UnknownCommand { id: u8 },

    #[error("Payload too long: {len} bytes (max {max})")]
    PayloadTooLong { len: usize, max: usize },

    #[error("Conflicting scan modes in mask 0x{mask:04X}")]
    ConflictingModes { mask: u16 },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u16 },
}

/// 字节序转换工具函数
///
/// 上位机命令帧使用大端字节序，舵机协议使用小端字节序。
///
/// 大端字节序转 u16
pub fn bytes_to_u16_be(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

/// 大端字节序转 i16
pub fn bytes_to_i16_be(bytes: [u8; 2]) -> i16 {
    i16::from_be_bytes(bytes)
}

/// u16 转大端字节序
pub fn u16_to_bytes_be(value: u16) -> [u8; 2] {
    value.to_be_bytes()
}

/// i16 转大端字节序
pub fn i16_to_bytes_be(value: i16) -> [u8; 2] {
    value.to_be_bytes()
}

/// 小端字节序转 i16
pub fn bytes_to_i16_le(bytes: [u8; 2]) -> i16 {
    i16::from_le_bytes(bytes)
}

/// 从缓冲区固定偏移读取两个字节
///
/// # 错误
///
/// 缓冲区长度不足时返回 `ProtocolError::InvalidLength`。
pub fn read_pair(buf: &[u8], offset: usize) -> Result<[u8; 2], ProtocolError> {
    match buf.get(offset..offset + 2) {
        Some(pair) => Ok([pair[0], pair[1]]),
        None => Err(ProtocolError::InvalidLength {
            expected: offset + 2,
            actual: buf.len(),
        }),
    }
}

/// 从缓冲区固定偏移读取一个字节
pub fn read_byte(buf: &[u8], offset: usize) -> Result<u8, ProtocolError> {
    buf.get(offset).copied().ok_or(ProtocolError::InvalidLength {
        expected: offset + 1,
        actual: buf.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_u16_be() {
        assert_eq!(bytes_to_u16_be([0x12, 0x34]), 0x1234);
    }

    #[test]
    fn test_bytes_to_i16_be_negative() {
        assert_eq!(bytes_to_i16_be([0xFF, 0xFE]), -2);
    }

    #[test]
    fn test_be_roundtrip() {
        assert_eq!(bytes_to_u16_be(u16_to_bytes_be(1000)), 1000);
        assert_eq!(bytes_to_i16_be(i16_to_bytes_be(-900)), -900);
    }

    #[test]
    fn test_bytes_to_i16_le() {
        assert_eq!(bytes_to_i16_le([0x64, 0x00]), 100);
        assert_eq!(bytes_to_i16_le([0x9C, 0xFF]), -100);
    }

    #[test]
    fn test_read_pair_out_of_range() {
        let buf = [0u8; 4];
        assert_eq!(read_pair(&buf, 2).unwrap(), [0, 0]);
        assert_eq!(
            read_pair(&buf, 3),
            Err(ProtocolError::InvalidLength {
                expected: 5,
                actual: 4
            })
        );
        assert!(read_byte(&buf, 4).is_err());
    }

    #[test]
    fn test_error_display() {
        let err = ProtocolError::ChecksumMismatch {
            expected: 0x10,
            actual: 0x11,
        };
        assert!(err.to_string().contains("0x10"));
        let err = ProtocolError::ConflictingModes { mask: 0x0003 };
        assert!(err.to_string().contains("0x0003"));
    }
}
