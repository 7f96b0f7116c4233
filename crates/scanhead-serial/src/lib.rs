//! # Scan Head Serial Layer
//!
//! 串口字节流抽象层：扫描头的舵机链路与上位机链路都是半双工串口，
//! 发送为非阻塞写入，接收按空闲间隔分段。

use std::time::Duration;
use thiserror::Error;

pub mod mock;
pub mod port;

pub use mock::MockTransport;
pub use port::{SerialPortTransport, list_ports};

/// 串口层统一错误类型
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serial port error: {0}")]
    Port(#[from] serialport::Error),
    #[error("Read timeout")]
    Timeout,
    #[error("Link disconnected")]
    Disconnected,
}

impl SerialError {
    /// 是否为致命错误（设备断开、端口不可用）
    pub fn is_fatal(&self) -> bool {
        matches!(self, SerialError::Disconnected | SerialError::Port(_))
    }
}

/// 串口字节流传输
pub trait SerialTransport {
    /// 发送一段字节
    fn send(&mut self, bytes: &[u8]) -> Result<(), SerialError>;

    /// 接收一段字节（以空闲间隔分段）
    ///
    /// 在接收超时内没有任何字节到达时返回 `SerialError::Timeout`。
    fn receive(&mut self) -> Result<Vec<u8>, SerialError>;

    fn set_receive_timeout(&mut self, _timeout: Duration) {}

    fn receive_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, SerialError> {
        self.set_receive_timeout(timeout);
        self.receive()
    }

    fn try_receive(&mut self) -> Result<Option<Vec<u8>>, SerialError> {
        match self.receive_timeout(Duration::ZERO) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(SerialError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<T: SerialTransport + ?Sized> SerialTransport for Box<T> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        (**self).send(bytes)
    }

    fn receive(&mut self) -> Result<Vec<u8>, SerialError> {
        (**self).receive()
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        (**self).set_receive_timeout(timeout)
    }
}
