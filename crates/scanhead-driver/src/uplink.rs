//! 上位机上行通道
//!
//! 遥测帧与转发的舵机应答都经由同一个有界队列交给上位机 IO 线程。
//! 队列满时丢弃并计数，不阻塞调用方（周期上传与转发都在时间敏感的上下文中）。

use crate::error::DriverError;
use crate::metrics::LinkMetrics;
use crossbeam_channel::{Sender, TrySendError};
use scanhead_protocol::TelemetryFrame;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::trace;

/// 上行发送句柄
#[derive(Clone)]
pub struct HostUplink {
    tx: Sender<Vec<u8>>,
    metrics: Arc<LinkMetrics>,
}

impl HostUplink {
    pub(crate) fn new(tx: Sender<Vec<u8>>, metrics: Arc<LinkMetrics>) -> Self {
        Self { tx, metrics }
    }

    /// 发送一段原始字节
    ///
    /// # 错误
    ///
    /// - `DriverError::ChannelFull`: 队列已满，数据被丢弃
    /// - `DriverError::ChannelClosed`: 上位机 IO 线程已退出
    pub fn send(&self, bytes: Vec<u8>) -> Result<(), DriverError> {
        self.tx.try_send(bytes).map_err(|e| match e {
            TrySendError::Full(_) => {
                self.metrics.uplink_drops.fetch_add(1, Ordering::Relaxed);
                DriverError::ChannelFull
            },
            TrySendError::Disconnected(_) => DriverError::ChannelClosed,
        })
    }

    /// 上传一帧遥测
    pub fn send_telemetry(&self, frame: &TelemetryFrame) -> Result<(), DriverError> {
        self.send(frame.to_bytes().to_vec())?;
        self.metrics.telemetry_frames.fetch_add(1, Ordering::Relaxed);
        trace!(
            "Telemetry uploaded: master={}, sub={}",
            frame.master_frame, frame.sub_frame
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_full_queue_counts_drop() {
        let (tx, rx) = bounded(1);
        let metrics = Arc::new(LinkMetrics::new());
        let uplink = HostUplink::new(tx, metrics.clone());

        uplink.send(vec![1]).unwrap();
        assert!(matches!(uplink.send(vec![2]), Err(DriverError::ChannelFull)));
        assert_eq!(metrics.snapshot().uplink_drops, 1);

        drop(rx);
        assert!(matches!(uplink.send(vec![3]), Err(DriverError::ChannelClosed)));
    }

    #[test]
    fn test_telemetry_is_forty_bytes() {
        let (tx, rx) = bounded(4);
        let metrics = Arc::new(LinkMetrics::new());
        let uplink = HostUplink::new(tx, metrics.clone());

        uplink.send_telemetry(&TelemetryFrame::default()).unwrap();
        assert_eq!(rx.try_recv().unwrap().len(), 40);
        assert_eq!(metrics.snapshot().telemetry_frames, 1);
    }
}
