//! 帧钩子
//!
//! 在舵机链路收发帧时触发自定义回调，用于抓包、调试输出与测试观测。
//! 回调在 IO 线程中同步执行，必须是非阻塞的（推荐 `try_send` 到 channel）。
//!
//! ```rust
//! use scanhead_driver::hooks::{ChannelHook, FrameDirection, HookManager};
//! use std::sync::Arc;
//!
//! let mut hooks = HookManager::new();
//! let (hook, rx) = ChannelHook::new(64);
//! hooks.add_callback(Arc::new(hook));
//!
//! hooks.trigger_sent(&[0x12, 0x4C, 0x01, 0x01, 0x00, 0x60]);
//! let (direction, frame) = rx.try_recv().unwrap();
//! assert_eq!(direction, FrameDirection::Sent);
//! assert_eq!(frame.len(), 6);
//! ```

use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;

/// 帧回调 Trait
pub trait FrameCallback: Send + Sync {
    /// 收到一个完整的舵机应答帧（解码之前）
    fn on_frame_received(&self, frame: &[u8]);

    /// 请求帧写入串口成功后调用
    fn on_frame_sent(&self, frame: &[u8]) {
        let _ = frame;
    }
}

/// 帧方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDirection {
    Sent,
    Received,
}

/// 把帧转发到有界 channel 的钩子（队列满时丢弃）
#[derive(Debug)]
pub struct ChannelHook {
    tx: Sender<(FrameDirection, Vec<u8>)>,
}

impl ChannelHook {
    pub fn new(capacity: usize) -> (Self, Receiver<(FrameDirection, Vec<u8>)>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }
}

impl FrameCallback for ChannelHook {
    fn on_frame_received(&self, frame: &[u8]) {
        let _ = self.tx.try_send((FrameDirection::Received, frame.to_vec()));
    }

    fn on_frame_sent(&self, frame: &[u8]) {
        let _ = self.tx.try_send((FrameDirection::Sent, frame.to_vec()));
    }
}

/// 钩子管理器
///
/// 回调列表本身不是线程安全的，需要外部同步（`ScanHead` 中使用 `RwLock<HookManager>`）。
#[derive(Default)]
pub struct HookManager {
    callbacks: Vec<Arc<dyn FrameCallback>>,
}

impl HookManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    pub fn add_callback(&mut self, callback: Arc<dyn FrameCallback>) {
        self.callbacks.push(callback);
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    /// 触发所有接收回调
    pub fn trigger_received(&self, frame: &[u8]) {
        for callback in self.callbacks.iter() {
            callback.on_frame_received(frame);
        }
    }

    /// 触发所有发送回调
    pub fn trigger_sent(&self, frame: &[u8]) {
        for callback in self.callbacks.iter() {
            callback.on_frame_sent(frame);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}
