//! 内存串口（用于测试与仿真）
//!
//! `MockTransport::pair()` 返回两个互连的端点：一端发送的每段字节
//! 在另一端作为一次接收结果出现，保留分段边界。

use crate::{SerialError, SerialTransport};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::time::Duration;

/// 内存串口端点
#[derive(Debug)]
pub struct MockTransport {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    receive_timeout: Duration,
}

impl MockTransport {
    /// 创建一对互连的端点
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        let timeout = Duration::from_millis(2);
        (
            Self {
                tx: a_tx,
                rx: a_rx,
                receive_timeout: timeout,
            },
            Self {
                tx: b_tx,
                rx: b_rx,
                receive_timeout: timeout,
            },
        )
    }

    /// 对端尚未读取的分段数
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl SerialTransport for MockTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        self.tx
            .send(bytes.to_vec())
            .map_err(|_| SerialError::Disconnected)
    }

    fn receive(&mut self) -> Result<Vec<u8>, SerialError> {
        match self.rx.recv_timeout(self.receive_timeout) {
            Ok(bytes) => Ok(bytes),
            Err(RecvTimeoutError::Timeout) => Err(SerialError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(SerialError::Disconnected),
        }
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.receive_timeout = timeout;
    }
}
