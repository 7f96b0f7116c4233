//! 链路统计
//!
//! 被静默丢弃的帧不会上报上位机，只在这里计数。

use std::sync::atomic::{AtomicU64, Ordering};

/// 链路计数器
#[derive(Debug, Default)]
pub struct LinkMetrics {
    pub actuator_tx_frames: AtomicU64,
    pub actuator_rx_frames: AtomicU64,
    /// 帧头错误或长度不足
    pub malformed_frames: AtomicU64,
    /// 严格模式下校验和不一致
    pub checksum_failures: AtomicU64,
    pub unknown_commands: AtomicU64,
    /// 链路空闲超时后丢弃的半帧字节
    pub stale_bytes: AtomicU64,
    /// 转发给上位机的舵机应答
    pub relayed_frames: AtomicU64,
    pub telemetry_frames: AtomicU64,
    pub host_commands: AtomicU64,
    /// 上行队列满而丢弃的数据段
    pub uplink_drops: AtomicU64,
    pub device_errors: AtomicU64,
}

/// 计数器快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub actuator_tx_frames: u64,
    pub actuator_rx_frames: u64,
    pub malformed_frames: u64,
    pub checksum_failures: u64,
    pub unknown_commands: u64,
    pub stale_bytes: u64,
    pub relayed_frames: u64,
    pub telemetry_frames: u64,
    pub host_commands: u64,
    pub uplink_drops: u64,
    pub device_errors: u64,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            actuator_tx_frames: load(&self.actuator_tx_frames),
            actuator_rx_frames: load(&self.actuator_rx_frames),
            malformed_frames: load(&self.malformed_frames),
            checksum_failures: load(&self.checksum_failures),
            unknown_commands: load(&self.unknown_commands),
            stale_bytes: load(&self.stale_bytes),
            relayed_frames: load(&self.relayed_frames),
            telemetry_frames: load(&self.telemetry_frames),
            host_commands: load(&self.host_commands),
            uplink_drops: load(&self.uplink_drops),
            device_errors: load(&self.device_errors),
        }
    }
}
