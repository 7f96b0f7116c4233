//! 控制层错误类型

use scanhead_driver::DriverError;
use scanhead_protocol::ProtocolError;
use thiserror::Error;

/// 控制层错误
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 模式掩码同时选中多个扫描模式
    #[error("Conflicting scan modes in mask {mask:#06x}")]
    ConflictingModes { mask: u16 },

    /// 配置文件错误
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ControlError {
    /// 把协议层的模式冲突映射为控制层错误
    pub(crate) fn from_mode(err: ProtocolError) -> Self {
        match err {
            ProtocolError::ConflictingModes { mask } => ControlError::ConflictingModes { mask },
            other => ControlError::Protocol(other),
        }
    }
}
