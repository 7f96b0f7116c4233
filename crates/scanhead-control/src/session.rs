//! 扫描会话状态
//!
//! 会话在一次模式进入期间持续存在，模式重新进入时重置。
//! 发射管子步索引与主/子帧号由周期上传线程共享，保存在驱动层的
//! [`FrameCounters`](scanhead_driver::FrameCounters) 中。

use crate::sweep::{Direction, Sweep};
use scanhead_protocol::ScanMode;

/// 扫描会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSession {
    /// 会话所属模式
    pub mode: ScanMode,
    /// 进入时的模式复位计数
    pub epoch: u32,
    /// 步进扫描位置与方向
    pub sweep: Sweep,
    /// 当前目标位置
    pub target: i16,
    /// 当前步的重试次数
    pub retries: u32,
    /// 已完成（确认到位）的子步数
    pub completed_steps: u64,
}

impl ScanSession {
    pub fn new(mode: ScanMode, epoch: u32, low: i16) -> Self {
        Self {
            mode,
            epoch,
            sweep: Sweep::new(low),
            target: low,
            retries: 0,
            completed_steps: 0,
        }
    }

    pub fn direction(&self) -> Direction {
        self.sweep.direction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_starts_forward_at_low() {
        let session = ScanSession::new(ScanMode::Discrete, 3, 200);
        assert_eq!(session.sweep.position(), 200);
        assert_eq!(session.direction(), Direction::Forward);
        assert_eq!(session.retries, 0);
        assert_eq!(session.epoch, 3);
    }
}
