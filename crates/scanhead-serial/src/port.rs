//! 基于 `serialport` 的串口传输

use crate::{SerialError, SerialTransport};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::{debug, trace};

/// 单段接收的最大字节数
const MAX_CHUNK: usize = 256;

/// 串口传输
///
/// 接收语义：首字节最多等待 `receive_timeout`；收到首字节后持续读取，
/// 直到链路空闲超过 `idle_gap`，这一段字节作为一次接收结果返回。
pub struct SerialPortTransport {
    port: Box<dyn SerialPort>,
    receive_timeout: Duration,
    idle_gap: Duration,
    name: String,
}

impl SerialPortTransport {
    /// 打开串口（8N1）
    ///
    /// # 参数
    ///
    /// - `path`: 设备路径，如 `/dev/ttyUSB0`
    /// - `baud_rate`: 波特率
    /// - `idle_gap`: 分段空闲间隔
    pub fn open(path: &str, baud_rate: u32, idle_gap: Duration) -> Result<Self, SerialError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(idle_gap)
            .open()?;
        debug!("Opened serial port {} at {} baud", path, baud_rate);
        Ok(Self {
            port,
            receive_timeout: Duration::from_millis(2),
            idle_gap,
            name: path.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn read_some(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, SerialError> {
        self.port.set_timeout(timeout)?;
        match self.port.read(buf) {
            Ok(0) => Err(SerialError::Disconnected),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Err(SerialError::Timeout)
            },
            Err(e) => Err(SerialError::Io(e)),
        }
    }
}

impl SerialTransport for SerialPortTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        trace!("{} <- {:02X?}", self.name, bytes);
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, SerialError> {
        let mut chunk = [0u8; MAX_CHUNK];
        let first = self.read_some(&mut chunk, self.receive_timeout)?;
        let mut out = chunk[..first].to_vec();

        while out.len() < MAX_CHUNK {
            match self.read_some(&mut chunk, self.idle_gap) {
                Ok(n) => out.extend_from_slice(&chunk[..n]),
                Err(SerialError::Timeout) => break,
                Err(e) => return Err(e),
            }
        }
        trace!("{} -> {:02X?}", self.name, out);
        Ok(out)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.receive_timeout = timeout;
    }
}

/// 列出系统中的串口设备
pub fn list_ports() -> Result<Vec<String>, SerialError> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|info| info.port_name)
        .collect())
}
