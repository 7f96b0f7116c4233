//! 上位机命令分发
//!
//! 消费 IO 线程交付的上位机缓冲：改写运行参数、重算周期、执行一次性的舵机
//! 调试请求，或在模式掩码被改写时执行模式复位。
//!
//! 缓冲在处理后总是被清空，无论命令是否被识别。

use crate::error::ControlError;
use crossbeam_channel::RecvTimeoutError;
use scanhead_driver::ScanHead;
use scanhead_protocol::{ControlParams, HostCommand, ModeMask, ProtocolError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// 等待下一条命令的间隔（同时用于检查停止标志）
const RECV_POLL: Duration = Duration::from_millis(20);

/// 命令分发器
pub struct CommandDispatcher {
    head: Arc<ScanHead>,
}

fn validate_mask(mask: u16) -> Result<(), ControlError> {
    ModeMask::from_raw(mask)
        .scan_mode()
        .map(|_| ())
        .map_err(ControlError::from_mode)
}

impl CommandDispatcher {
    pub fn new(head: Arc<ScanHead>) -> Self {
        Self { head }
    }

    /// 处理一个上位机缓冲
    ///
    /// 无论成功与否，`buffer` 返回时都已清空。
    ///
    /// # 错误
    ///
    /// - `ControlError::Protocol`: 帧头错误、未知命令或字段不完整
    /// - `ControlError::ConflictingModes`: 新掩码同时选中多个模式（参数不变）
    /// - `ControlError::Driver`: 舵机链路或增益总线错误
    pub fn dispatch(&self, buffer: &mut Vec<u8>) -> Result<HostCommand, ControlError> {
        let bytes = std::mem::take(buffer);
        let command = HostCommand::parse(&bytes)?;
        trace!("Host command {:?}", command);
        self.apply(command)?;
        Ok(command)
    }

    /// 执行一条已解析的命令
    pub fn apply(&self, command: HostCommand) -> Result<(), ControlError> {
        let head = &self.head;
        let ctx = head.context();

        match command {
            HostCommand::ReadParams => {
                head.uplink().send(head.params().to_block().to_vec())?;
            },
            HostCommand::WriteParams(params) => {
                validate_mask(params.mode_mask)?;
                ctx.update_params(|p| *p = params);
                head.restart_ticks();
            },
            HostCommand::SetUploadRate(rate) => {
                ctx.update_params(|p| p.upload_rate_hz = rate);
                head.restart_ticks();
            },
            HostCommand::SetAdjustRate(rate) => {
                ctx.update_params(|p| p.adjust_rate_hz = rate);
                head.restart_ticks();
            },
            HostCommand::SetDwell(dwell_ms) => {
                ctx.update_params(|p| p.dwell_ms = dwell_ms);
            },
            HostCommand::SetPositions {
                low,
                high,
                step,
                target,
            } => {
                ctx.update_params(|p| {
                    p.low = low;
                    p.high = high;
                    p.step = step;
                    p.target = target;
                });
            },
            HostCommand::SetModeMask(mask) => {
                validate_mask(mask)?;
                ctx.update_params(|p| p.mode_mask = mask);
            },
            HostCommand::SetWarmup(warmup_ms) => {
                ctx.update_params(|p| p.warmup_ms = warmup_ms);
            },
            HostCommand::GainRead { bus } => {
                let value = head.gain().read(bus)?;
                head.uplink().send(vec![value])?;
            },
            HostCommand::GainWrite { bus, data } => {
                head.gain().write(bus, data)?;
            },
            HostCommand::ServoPing { servo_id } => {
                head.link().ping(servo_id)?;
            },
            HostCommand::ServoMove {
                servo_id,
                angle,
                duration_ms,
            } => {
                head.link().reissue_move(servo_id, angle, duration_ms)?;
            },
            HostCommand::ServoReadAngle { servo_id } => {
                head.link().read_angle(servo_id)?;
            },
            HostCommand::ServoDataRead { servo_id, metric } => {
                head.link().read_metric(servo_id, metric)?;
            },
            HostCommand::ServoMonitor { servo_id, metric } => {
                head.link().monitor(servo_id, metric)?;
            },
            HostCommand::StartDebug {
                mode_mask,
                target,
                dwell_ms,
            } => {
                validate_mask(mode_mask)?;
                ctx.update_params(|p| {
                    p.mode_mask = mode_mask;
                    p.target = target;
                    p.dwell_ms = dwell_ms;
                });
            },
            HostCommand::StartContinuous {
                mode_mask,
                low,
                high,
                dwell_ms,
                warmup_ms,
            } => {
                validate_mask(mode_mask)?;
                ctx.update_params(|p| {
                    p.mode_mask = mode_mask;
                    p.low = low;
                    p.high = high;
                    p.dwell_ms = dwell_ms;
                    p.warmup_ms = warmup_ms;
                });
            },
            HostCommand::StartDiscrete {
                mode_mask,
                low,
                high,
                step,
                dwell_ms,
                warmup_ms,
            } => {
                validate_mask(mode_mask)?;
                ctx.update_params(|p| {
                    p.mode_mask = mode_mask;
                    p.low = low;
                    p.high = high;
                    p.step = step;
                    p.dwell_ms = dwell_ms;
                    p.warmup_ms = warmup_ms;
                });
            },
        }

        if command.rewrites_mode() {
            head.reset_mode();
        }
        Ok(())
    }

    /// 当前参数快照
    pub fn params(&self) -> ControlParams {
        self.head.params()
    }

    /// 持续分发上位机命令，直到停止或 IO 线程退出
    ///
    /// 单条命令的错误只记录日志，不回送上位机。
    pub fn run(&self, stop: &AtomicBool) {
        info!("Command dispatcher started");
        let commands = self.head.host_commands();

        while !stop.load(Ordering::Acquire) && self.head.is_running() {
            match commands.recv_timeout(RECV_POLL) {
                Ok(mut buffer) => match self.dispatch(&mut buffer) {
                    Ok(_) => {},
                    Err(ControlError::Protocol(ProtocolError::UnknownCommand { id })) => {
                        debug!("Ignoring unknown host command 0x{:02X}", id);
                    },
                    Err(ControlError::Protocol(e)) => {
                        debug!("Dropping malformed host buffer: {}", e);
                    },
                    Err(e) => warn!("Host command failed: {}", e),
                },
                Err(RecvTimeoutError::Timeout) => {},
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("Command dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanhead_driver::ScanHeadBuilder;
    use scanhead_protocol::HOST_MAGIC;
    use scanhead_serial::MockTransport;

    struct Fixture {
        dispatcher: CommandDispatcher,
        head: Arc<ScanHead>,
        _ends: (MockTransport, MockTransport),
    }

    fn fixture() -> Fixture {
        let (actuator, servo_end) = MockTransport::pair();
        let (host, host_end) = MockTransport::pair();
        let params = ControlParams {
            upload_rate_hz: 0,
            adjust_rate_hz: 0,
            ..ControlParams::default()
        };
        let head = Arc::new(
            ScanHeadBuilder::new()
                .params(params)
                .build(actuator, host)
                .unwrap(),
        );
        Fixture {
            dispatcher: CommandDispatcher::new(head.clone()),
            head,
            _ends: (servo_end, host_end),
        }
    }

    #[test]
    fn test_buffer_cleared_on_unknown_command() {
        let f = fixture();
        let mut buffer = vec![HOST_MAGIC[0], HOST_MAGIC[1], 0x7F];
        let result = f.dispatcher.dispatch(&mut buffer);
        assert!(matches!(
            result,
            Err(ControlError::Protocol(ProtocolError::UnknownCommand { id: 0x7F }))
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_buffer_cleared_on_bad_magic() {
        let f = fixture();
        let mut buffer = vec![0x00, 0x00, 0x01];
        assert!(f.dispatcher.dispatch(&mut buffer).is_err());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_set_positions_rewrites_fields() {
        let f = fixture();
        let mut buffer = HostCommand::SetPositions {
            low: -100,
            high: 900,
            step: 50,
            target: 400,
        }
        .encode();
        f.dispatcher.dispatch(&mut buffer).unwrap();

        let params = f.dispatcher.params();
        assert_eq!(
            (params.low, params.high, params.step, params.target),
            (-100, 900, 50, 400)
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_mode_rewrite_resets_counters_and_token() {
        let f = fixture();
        let ctx = f.head.context();
        ctx.counters.advance_emitter();
        ctx.counters.next_sub();
        f.head.link().move_to(1, 100, 10).unwrap();
        let epoch = ctx.mode_epoch();

        f.dispatcher
            .apply(HostCommand::SetModeMask(ModeMask::DISCRETE_BIT))
            .unwrap();

        assert_eq!(ctx.counters.emitter_index(), 0);
        assert_eq!(ctx.counters.sub(), 0);
        assert_eq!(ctx.counters.master(), 0);
        assert!(!f.head.link().is_locked());
        assert_eq!(ctx.mode_epoch(), epoch + 1);
        assert_eq!(f.dispatcher.params().mode_mask, ModeMask::DISCRETE_BIT);
    }

    #[test]
    fn test_conflicting_mask_leaves_params_unchanged() {
        let f = fixture();
        let epoch = f.head.context().mode_epoch();
        let result = f.dispatcher.apply(HostCommand::StartDiscrete {
            mode_mask: ModeMask::DISCRETE_BIT | ModeMask::DEBUG_BIT,
            low: 0,
            high: 10,
            step: 1,
            dwell_ms: 5,
            warmup_ms: 5,
        });
        assert!(matches!(
            result,
            Err(ControlError::ConflictingModes { mask: 0x0005 })
        ));
        assert_eq!(f.dispatcher.params().mode_mask, 0);
        assert_eq!(f.dispatcher.params().high, 1000);
        assert_eq!(f.head.context().mode_epoch(), epoch);
    }

    #[test]
    fn test_rate_change_keeps_mode() {
        let f = fixture();
        let epoch = f.head.context().mode_epoch();
        f.dispatcher.apply(HostCommand::SetAdjustRate(20)).unwrap();
        assert_eq!(f.dispatcher.params().adjust_rate_hz, 20);
        assert_eq!(f.head.context().mode_epoch(), epoch);
    }

    #[test]
    fn test_gain_read_without_bus() {
        let f = fixture();
        let result = f.dispatcher.apply(HostCommand::GainRead { bus: 0 });
        assert!(matches!(
            result,
            Err(ControlError::Driver(scanhead_driver::DriverError::NoGainBus))
        ));
    }
}
