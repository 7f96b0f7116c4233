//! 字节流重组
//!
//! 串口按空闲间隔分段接收，一段里可能有半帧，也可能有多帧。
//!
//! - [`ResponseAssembler`]: 扫描头侧，从舵机应答流中切出完整应答帧
//! - [`HostStreamDecoder`]: 上位机侧，从上传流中切出遥测记录和转发的舵机应答

use crate::actuator::{FrameBytes, FrameView};
use crate::ids::*;
use crate::telemetry::{TELEMETRY_FRAME_LEN, TelemetryFrame};
use bytes::{Buf, BytesMut};

/// 舵机应答帧重组器
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    buf: BytesMut,
    discarded: u64,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加收到的字节
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// 取出下一个完整应答帧
    ///
    /// 帧头之前的字节和长度字段非法的帧头被丢弃（计入 `discarded_bytes`）。
    /// 不完整的帧留在缓冲区等待后续字节。
    pub fn next_frame(&mut self) -> Option<FrameBytes> {
        loop {
            match find_magic(&self.buf, RESPONSE_MAGIC) {
                Some(0) => {},
                Some(pos) => self.discard(pos),
                None => {
                    // 末尾可能是半个帧头
                    let keep = usize::from(self.buf.last() == Some(&RESPONSE_MAGIC[0]));
                    let drop = self.buf.len() - keep;
                    self.discard(drop);
                    return None;
                },
            }

            if self.buf.len() < 4 {
                return None;
            }
            let total = FRAME_OVERHEAD + self.buf[3] as usize;
            if total > MAX_RESPONSE_LEN {
                self.discard(1);
                continue;
            }
            if self.buf.len() < total {
                return None;
            }
            return Some(FrameBytes::from_slice(&self.buf.split_to(total)));
        }
    }

    /// 缓冲区中尚未成帧的字节数
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// 丢弃未成帧的字节（链路空闲超时后调用）
    pub fn clear(&mut self) {
        let len = self.buf.len();
        self.discard(len);
    }

    /// 累计丢弃的字节数
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    fn discard(&mut self, count: usize) {
        self.buf.advance(count);
        self.discarded += count as u64;
    }
}

fn find_magic(buf: &[u8], magic: [u8; 2]) -> Option<usize> {
    buf.windows(2).position(|w| w == magic)
}

/// 上传流中的一帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostFrame {
    Telemetry(TelemetryFrame),
    /// 扫描头转发的舵机应答（校验和已验证）
    Actuator(FrameBytes),
}

/// 上位机侧上传流解码器
///
/// 识别两类帧：`A9 B5 … 33` 遥测记录与 `05 1C` 舵机应答。
/// 其他字节（参数块应答、增益读取应答）逐字节跳过并计数。
#[derive(Debug, Default)]
pub struct HostStreamDecoder {
    buf: BytesMut,
    skipped: u64,
}

impl HostStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// 取出下一帧，数据不足时返回 `None`
    pub fn next_frame(&mut self) -> Option<HostFrame> {
        loop {
            if self.buf.len() < 2 {
                return None;
            }
            let head = [self.buf[0], self.buf[1]];

            if head == TELEMETRY_SYNC_HEAD {
                if self.buf.len() < TELEMETRY_FRAME_LEN {
                    return None;
                }
                match TelemetryFrame::try_from(&self.buf[..TELEMETRY_FRAME_LEN]) {
                    Ok(frame) => {
                        self.buf.advance(TELEMETRY_FRAME_LEN);
                        return Some(HostFrame::Telemetry(frame));
                    },
                    Err(_) => self.skip(1),
                }
            } else if head == RESPONSE_MAGIC {
                if self.buf.len() < 4 {
                    return None;
                }
                let total = FRAME_OVERHEAD + self.buf[3] as usize;
                if total > MAX_RESPONSE_LEN {
                    self.skip(1);
                    continue;
                }
                if self.buf.len() < total {
                    return None;
                }
                let valid = FrameView::parse(&self.buf[..total], RESPONSE_MAGIC)
                    .and_then(|view| view.verify_checksum())
                    .is_ok();
                if valid {
                    let frame = FrameBytes::from_slice(&self.buf.split_to(total));
                    return Some(HostFrame::Actuator(frame));
                }
                self.skip(1);
            } else {
                self.skip(1);
            }
        }
    }

    /// 累计跳过的字节数
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    fn skip(&mut self, count: usize) {
        self.buf.advance(count);
        self.skipped += count as u64;
    }
}
