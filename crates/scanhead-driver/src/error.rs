//! 驱动层错误类型定义

use scanhead_protocol::ProtocolError;
use scanhead_serial::SerialError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 串口错误
    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 发送通道已关闭（IO 线程退出）
    #[error("Command channel closed")]
    ChannelClosed,

    /// 发送通道已满
    #[error("Command channel full")]
    ChannelFull,

    /// 已有一个舵机事务未完成（完成令牌处于 Locked）
    #[error("Actuator transaction already pending")]
    TransactionPending,

    /// 增益总线未配置
    #[error("Gain bus not configured")]
    NoGainBus,

    /// 增益总线事务失败
    #[error("Gain bus error: {0}")]
    GainBus(String),

    /// 发射管输出失败
    #[error("Emitter output error: {0}")]
    Emitter(String),

    /// IO 线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,
}
