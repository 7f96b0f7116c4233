//! Pipeline IO 循环模块
//!
//! 两个后台线程：
//! - 舵机链路：发送排队的请求帧，接收应答、重组成帧、解码并更新共享状态
//! - 上位机链路：发送上行数据（遥测与转发），把收到的命令缓冲交给分发器

use crate::metrics::LinkMetrics;
use crate::state::ScanContext;
use crate::uplink::HostUplink;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use scanhead_protocol::{
    ActuatorEvent, ChecksumPolicy, FrameBytes, ProtocolError, ResponseAssembler, decode,
};
use scanhead_serial::{SerialError, SerialTransport};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// Pipeline 配置
///
/// # Example
///
/// ```
/// use scanhead_driver::PipelineConfig;
/// use scanhead_protocol::ChecksumPolicy;
///
/// let config = PipelineConfig {
///     checksum: ChecksumPolicy::Strict,
///     ..PipelineConfig::default()
/// };
/// assert_eq!(config.receive_timeout_ms, 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// 串口接收超时（毫秒）
    pub receive_timeout_ms: u64,
    /// 半帧超时（毫秒）
    /// 收到部分应答后超过此时间仍未收齐，则丢弃缓存
    pub frame_timeout_ms: u64,
    /// 应答帧校验和策略
    pub checksum: ChecksumPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 2,
            frame_timeout_ms: 20,
            checksum: ChecksumPolicy::Lenient,
        }
    }
}

/// 舵机链路 IO 循环
///
/// # 参数
/// - `transport`: 舵机串口
/// - `cmd_rx`: 请求帧队列
/// - `ctx`: 共享状态上下文
/// - `uplink`: 转发应答用的上行通道
/// - `config`: Pipeline 配置
/// - `is_running`: 运行标志（用于生命周期联动）
/// - `metrics`: 链路计数
pub fn actuator_io_loop(
    mut transport: impl SerialTransport,
    cmd_rx: Receiver<FrameBytes>,
    ctx: Arc<ScanContext>,
    uplink: HostUplink,
    config: PipelineConfig,
    is_running: Arc<AtomicBool>,
    metrics: Arc<LinkMetrics>,
) {
    let frame_timeout = Duration::from_millis(config.frame_timeout_ms);
    let mut assembler = ResponseAssembler::new();
    let mut last_bytes = Instant::now();
    let mut discarded = 0;

    transport.set_receive_timeout(Duration::from_millis(config.receive_timeout_ms));

    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Actuator IO thread: is_running flag is false, exiting");
            break;
        }

        // 先发送积压的请求
        if drain_requests(&mut transport, &cmd_rx, &ctx, &metrics, &is_running) {
            break;
        }

        match transport.receive() {
            Ok(bytes) => {
                last_bytes = Instant::now();
                assembler.push(&bytes);
            },
            Err(SerialError::Timeout) => {
                if assembler.pending() > 0 && last_bytes.elapsed() > frame_timeout {
                    debug!(
                        "Dropping {} stale bytes after {:?} of silence",
                        assembler.pending(),
                        last_bytes.elapsed()
                    );
                    metrics
                        .stale_bytes
                        .fetch_add(assembler.pending() as u64, Ordering::Relaxed);
                    assembler.clear();
                    discarded = assembler.discarded_bytes();
                }
                continue;
            },
            Err(e) => {
                metrics.device_errors.fetch_add(1, Ordering::Relaxed);
                if e.is_fatal() {
                    error!("Actuator link fatal error: {}", e);
                    is_running.store(false, Ordering::Release);
                    break;
                }
                warn!("Actuator receive error: {}", e);
                continue;
            },
        }

        while let Some(frame) = assembler.next_frame() {
            metrics.actuator_rx_frames.fetch_add(1, Ordering::Relaxed);
            if let Some(hooks) = ctx.hooks.try_read() {
                hooks.trigger_received(&frame);
            }
            handle_response(&frame, &ctx, &uplink, config.checksum, &metrics);
        }

        let total = assembler.discarded_bytes();
        if total != discarded {
            metrics.malformed_frames.fetch_add(1, Ordering::Relaxed);
            trace!("Discarded {} bytes while seeking response magic", total - discarded);
            discarded = total;
        }
    }
}

/// 解码一个应答帧并更新状态
///
/// 解码失败的帧静默丢弃，只计数。
pub fn handle_response(
    frame: &[u8],
    ctx: &ScanContext,
    uplink: &HostUplink,
    checksum: ChecksumPolicy,
    metrics: &LinkMetrics,
) {
    let event = match decode(frame, checksum) {
        Ok(event) => event,
        Err(e) => {
            let counter = match e {
                ProtocolError::ChecksumMismatch { .. } => &metrics.checksum_failures,
                ProtocolError::UnknownCommand { .. } => &metrics.unknown_commands,
                _ => &metrics.malformed_frames,
            };
            counter.fetch_add(1, Ordering::Relaxed);
            debug!("Dropping actuator response {:02X?}: {}", frame, e);
            return;
        },
    };

    match event {
        ActuatorEvent::AngleReport { servo_id, angle } => {
            trace!("Servo {} angle report: {}", servo_id, angle);
            ctx.servo.record_angle(angle);
            ctx.servo.token.release();
        },
        ActuatorEvent::MoveAck { servo_id, success } => {
            if success {
                trace!("Servo {} move acknowledged", servo_id);
                ctx.servo.token.release();
            } else {
                debug!("Servo {} move rejected, token stays locked", servo_id);
            }
        },
        ActuatorEvent::Relay { command, frame } => {
            trace!("Relaying {:?} response to host", command);
            match uplink.send(frame.to_vec()) {
                Ok(()) => {
                    metrics.relayed_frames.fetch_add(1, Ordering::Relaxed);
                },
                Err(e) => warn!("Failed to relay {:?} response: {}", command, e),
            }
        },
    }
}

/// 发送队列中的请求帧
///
/// # 返回
///
/// 队列断开或链路致命错误时返回 true（IO 线程应退出）。
fn drain_requests(
    transport: &mut impl SerialTransport,
    cmd_rx: &Receiver<FrameBytes>,
    ctx: &ScanContext,
    metrics: &LinkMetrics,
    is_running: &AtomicBool,
) -> bool {
    const MAX_DRAIN_PER_CYCLE: usize = 16;

    for _ in 0..MAX_DRAIN_PER_CYCLE {
        match cmd_rx.try_recv() {
            Ok(frame) => match transport.send(&frame) {
                Ok(()) => {
                    metrics.actuator_tx_frames.fetch_add(1, Ordering::Relaxed);
                    if let Some(hooks) = ctx.hooks.try_read() {
                        hooks.trigger_sent(&frame);
                    }
                },
                Err(e) => {
                    metrics.device_errors.fetch_add(1, Ordering::Relaxed);
                    if e.is_fatal() {
                        error!("Actuator link fatal error on send: {}", e);
                        is_running.store(false, Ordering::Release);
                        return true;
                    }
                    error!("Failed to send actuator frame: {}", e);
                },
            },
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => return true,
        }
    }
    false
}

/// 上位机链路 IO 循环
///
/// 上行数据按入队顺序逐段写出（一段写完才写下一段）；
/// 收到的每段字节作为一条命令缓冲交给分发器。
pub fn host_io_loop(
    mut transport: impl SerialTransport,
    out_rx: Receiver<Vec<u8>>,
    command_tx: Sender<Vec<u8>>,
    config: PipelineConfig,
    is_running: Arc<AtomicBool>,
    metrics: Arc<LinkMetrics>,
) {
    transport.set_receive_timeout(Duration::from_millis(config.receive_timeout_ms));

    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Host IO thread: is_running flag is false, exiting");
            break;
        }

        loop {
            match out_rx.try_recv() {
                Ok(bytes) => {
                    if let Err(e) = transport.send(&bytes) {
                        metrics.device_errors.fetch_add(1, Ordering::Relaxed);
                        if e.is_fatal() {
                            error!("Host link fatal error on send: {}", e);
                            is_running.store(false, Ordering::Release);
                            return;
                        }
                        error!("Failed to send to host: {}", e);
                    }
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }

        match transport.receive() {
            Ok(bytes) => {
                metrics.host_commands.fetch_add(1, Ordering::Relaxed);
                trace!("Host buffer received: {:02X?}", bytes);
                match command_tx.try_send(bytes) {
                    Ok(()) => {},
                    Err(TrySendError::Full(_)) => {
                        warn!("Host command queue full, dropping buffer");
                    },
                    Err(TrySendError::Disconnected(_)) => return,
                }
            },
            Err(SerialError::Timeout) => {},
            Err(e) => {
                metrics.device_errors.fetch_add(1, Ordering::Relaxed);
                if e.is_fatal() {
                    error!("Host link fatal error: {}", e);
                    is_running.store(false, Ordering::Release);
                    break;
                }
                warn!("Host receive error: {}", e);
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use scanhead_protocol::{ActuatorCommand, encode_response};

    fn fixture() -> (Arc<ScanContext>, HostUplink, Receiver<Vec<u8>>, Arc<LinkMetrics>) {
        let ctx = Arc::new(ScanContext::default());
        let metrics = Arc::new(LinkMetrics::new());
        let (tx, rx) = bounded(8);
        (ctx, HostUplink::new(tx, metrics.clone()), rx, metrics)
    }

    #[test]
    fn test_angle_report_releases_token() {
        let (ctx, uplink, _rx, metrics) = fixture();
        assert!(ctx.servo.token.try_lock());
        let frame = encode_response(ActuatorCommand::ReadAngle, 1, &100i16.to_le_bytes()).unwrap();

        handle_response(&frame, &ctx, &uplink, ChecksumPolicy::Lenient, &metrics);
        assert_eq!(ctx.servo.last_angle(), 100);
        assert!(!ctx.servo.token.is_locked());
    }

    #[test]
    fn test_move_ack_status() {
        let (ctx, uplink, _rx, metrics) = fixture();
        assert!(ctx.servo.token.try_lock());

        let rejected = encode_response(ActuatorCommand::SingleAngleMove, 1, &[0x00]).unwrap();
        handle_response(&rejected, &ctx, &uplink, ChecksumPolicy::Lenient, &metrics);
        assert!(ctx.servo.token.is_locked());

        let accepted = encode_response(ActuatorCommand::SingleAngleMove, 1, &[0x01]).unwrap();
        handle_response(&accepted, &ctx, &uplink, ChecksumPolicy::Lenient, &metrics);
        assert!(!ctx.servo.token.is_locked());
    }

    #[test]
    fn test_ping_relayed_once() {
        let (ctx, uplink, rx, metrics) = fixture();
        let frame = encode_response(ActuatorCommand::Ping, 1, &[]).unwrap();
        handle_response(&frame, &ctx, &uplink, ChecksumPolicy::Lenient, &metrics);

        assert_eq!(rx.try_recv().unwrap(), frame.to_vec());
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.snapshot().relayed_frames, 1);
    }

    #[test]
    fn test_strict_checksum_drops_frame() {
        let (ctx, uplink, rx, metrics) = fixture();
        let mut frame = encode_response(ActuatorCommand::Ping, 1, &[]).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;

        handle_response(&frame, &ctx, &uplink, ChecksumPolicy::Strict, &metrics);
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.snapshot().checksum_failures, 1);

        handle_response(&frame, &ctx, &uplink, ChecksumPolicy::Lenient, &metrics);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_unknown_command_counted() {
        let (ctx, uplink, rx, metrics) = fixture();
        let frame = [0x05, 0x1C, 0x42, 0x01, 0x01, 0x00];
        handle_response(&frame, &ctx, &uplink, ChecksumPolicy::Lenient, &metrics);
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.snapshot().unknown_commands, 1);
    }
}
