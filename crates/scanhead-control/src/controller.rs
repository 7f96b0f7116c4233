//! 扫描控制器
//!
//! 前台循环：读取当前模式掩码，进入对应的模式处理函数，直到模式被改写、
//! 控制器被停止或 IO 线程退出。
//!
//! - **Debug**: 发射管按掩码静态点亮，舵机保持在目标位置，周期上传
//! - **Continuous**: 在上下限之间往返，每个半周期开启周期上传
//! - **Discrete**: 逐点步进，到位确认后每个发射管组合上传一帧
//!
//! 所有等待都可取消：模式复位计数变化、模式位变化或停止请求都会让等待返回
//! [`WaitOutcome::Cancelled`]。

use crate::error::ControlError;
use crate::session::ScanSession;
use scanhead_driver::{DriverError, ScanHead, WaitOutcome};
use scanhead_protocol::{ControlParams, ScanMode};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// 控制器配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Discrete 模式每个位置的最多尝试次数
    pub discrete_max_attempts: u32,
    /// Continuous 模式等待舵机到达边界的上限
    ///
    /// `None` 表示不限时（仍可取消）。超时后重新回到下限。
    pub continuous_confirm_timeout: Option<Duration>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            discrete_max_attempts: 3,
            continuous_confirm_timeout: None,
        }
    }
}

/// 一次模式进入的作用域
///
/// 记录进入时的模式与复位计数，`active()` 在其中任一变化后返回 false。
struct ModeScope<'a> {
    head: &'a ScanHead,
    stop: &'a AtomicBool,
    mode: ScanMode,
    epoch: u32,
}

impl ModeScope<'_> {
    fn active(&self) -> bool {
        !self.stop.load(Ordering::Acquire)
            && self.head.is_running()
            && self.head.context().mode_epoch() == self.epoch
            && matches!(self.head.params().scan_mode(), Ok(Some(mode)) if mode == self.mode)
    }

    /// 等待一段时间
    ///
    /// # 返回
    ///
    /// 等满返回 true；作用域失效时提前返回 false。
    fn pause(&self, duration: Duration) -> bool {
        let outcome = self
            .head
            .link()
            .poll_until(Some(duration), &|| !self.active(), || false);
        outcome == WaitOutcome::TimedOut
    }

    /// 作用域结束：关闭发射管；模式未被复位时停止周期上传
    fn leave(&self) {
        self.head.emitters_off();
        if self.head.context().mode_epoch() == self.epoch {
            self.head.stop_telemetry();
        }
    }
}

/// 发送队列暂满时返回 `busy`，其余错误向上返回
fn tolerate_full<T>(result: Result<T, DriverError>, busy: T) -> Result<T, ControlError> {
    match result {
        Err(DriverError::ChannelFull) => {
            warn!("Actuator queue full, retrying on next cycle");
            Ok(busy)
        },
        other => other.map_err(ControlError::from),
    }
}

/// 扫描控制器
pub struct ScanController {
    head: Arc<ScanHead>,
    config: ControllerConfig,
    session: Option<ScanSession>,
    stop: Arc<AtomicBool>,
    reported_conflict: Option<u16>,
}

impl ScanController {
    pub fn new(head: Arc<ScanHead>, config: ControllerConfig) -> Self {
        Self {
            head,
            config,
            session: None,
            stop: Arc::new(AtomicBool::new(false)),
            reported_conflict: None,
        }
    }

    pub fn config(&self) -> ControllerConfig {
        self.config
    }

    /// 停止标志（置位后 `run` 在当前等待结束时返回）
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// 当前会话（空闲时为 `None`）
    pub fn session(&self) -> Option<&ScanSession> {
        self.session.as_ref()
    }

    /// 运行前台循环，直到停止或 IO 线程退出
    pub fn run(&mut self) {
        info!("Scan controller started");
        let idle = self.head.link().config().poll_interval;

        while !self.stop.load(Ordering::Acquire) && self.head.is_running() {
            match self.run_once() {
                Ok(Some(_)) => {},
                Ok(None) => spin_sleep::sleep(idle),
                Err(ControlError::ConflictingModes { mask }) => {
                    if self.reported_conflict != Some(mask) {
                        warn!("Mode mask {:#06x} selects more than one scan mode", mask);
                        self.reported_conflict = Some(mask);
                    }
                    spin_sleep::sleep(idle);
                },
                Err(e) => {
                    warn!("Scan cycle failed: {}", e);
                    spin_sleep::sleep(idle);
                },
            }
        }

        self.head.emitters_off();
        info!("Scan controller stopped");
    }

    /// 执行一次模式调度
    ///
    /// 选中模式时阻塞在处理函数中，直到该模式不再生效。
    ///
    /// # 返回
    ///
    /// - `Ok(None)`: 空闲（没有选中模式）
    /// - `Ok(Some(mode))`: 已执行的模式
    ///
    /// # 错误
    ///
    /// - `ControlError::ConflictingModes`: 掩码同时选中多个模式
    /// - `ControlError::Driver`: 舵机链路不可用
    pub fn run_once(&mut self) -> Result<Option<ScanMode>, ControlError> {
        let params = self.head.params();
        let Some(mode) = params.scan_mode().map_err(ControlError::from_mode)? else {
            self.session = None;
            return Ok(None);
        };
        self.reported_conflict = None;

        let epoch = self.head.context().mode_epoch();
        let mut session = match self.session.take() {
            Some(session) if session.mode == mode && session.epoch == epoch => session,
            _ => {
                info!("Entering {:?} mode (epoch {})", mode, epoch);
                ScanSession::new(mode, epoch, params.low)
            },
        };

        let head = self.head.clone();
        let scope = ModeScope {
            head: &head,
            stop: &self.stop,
            mode,
            epoch,
        };
        let result = match mode {
            ScanMode::Debug => self.run_debug(&scope, &mut session),
            ScanMode::Continuous => self.run_continuous(&scope, &mut session),
            ScanMode::Discrete => self.run_discrete(&scope, &mut session),
        };
        scope.leave();
        self.session = Some(session);
        result.map(|_| Some(mode))
    }

    /// 驱动到 `target` 并等待运动应答
    ///
    /// 应答超时后重发，直到确认或作用域失效。
    ///
    /// # 返回
    ///
    /// 确认到位返回 true，被取消返回 false。
    fn drive_to(&self, scope: &ModeScope<'_>, target: i16) -> Result<bool, ControlError> {
        let link = scope.head.link();
        let servo_id = scope.head.servo_id();
        loop {
            if !scope.active() {
                return Ok(false);
            }
            let params = scope.head.params();
            let sent = tolerate_full(
                link.reissue_move(servo_id, target, params.dwell_ms).map(|_| true),
                false,
            )?;
            if !sent {
                if !scope.pause(link.config().poll_interval) {
                    return Ok(false);
                }
                continue;
            }

            match link.wait_released(Some(params.dwell() + params.warmup()), &|| !scope.active()) {
                WaitOutcome::Confirmed => return Ok(true),
                WaitOutcome::Cancelled => return Ok(false),
                _ => warn!("Move to {} not acknowledged, resending", target),
            }
        }
    }

    fn run_debug(
        &self,
        scope: &ModeScope<'_>,
        session: &mut ScanSession,
    ) -> Result<(), ControlError> {
        let head = scope.head;
        let mut holding: Option<i16> = None;

        while scope.active() {
            let params = head.params();
            head.set_emitters(params.mode_mask().emitters());

            if holding != Some(params.target) {
                session.target = params.target;
                if !self.drive_to(scope, params.target)? {
                    break;
                }
                debug!("Holding debug position {}", params.target);
                holding = Some(params.target);
            }

            if !head.telemetry_running() {
                head.start_telemetry();
            }
            if !scope.pause(params.warmup()) {
                break;
            }
        }
        Ok(())
    }

    fn run_continuous(
        &self,
        scope: &ModeScope<'_>,
        session: &mut ScanSession,
    ) -> Result<(), ControlError> {
        let head = scope.head;
        let link = head.link();
        let counters = &head.context().counters;
        let servo_id = head.servo_id();

        session.target = head.params().low;
        if !self.drive_to(scope, session.target)? {
            return Ok(());
        }

        while scope.active() {
            let params = head.params();
            head.set_emitters(counters.emitter_pair());
            if !scope.pause(params.warmup()) {
                break;
            }

            let at_bound = |angle: i16| angle == params.low || angle == params.high;
            if !at_bound(link.last_angle()) {
                let outcome = link.wait_for_angle(
                    servo_id,
                    at_bound,
                    self.config.continuous_confirm_timeout,
                    &|| !scope.active(),
                )?;
                match outcome {
                    WaitOutcome::Confirmed => {},
                    WaitOutcome::TimedOut => {
                        warn!(
                            "Servo did not reach a bound within {:?}, homing to {}",
                            self.config.continuous_confirm_timeout, params.low
                        );
                        session.target = params.low;
                        if !self.drive_to(scope, params.low)? {
                            break;
                        }
                        continue;
                    },
                    _ => break,
                }
            }

            session.target = if link.last_angle() == params.high {
                params.low
            } else {
                params.high
            };
            let sent = tolerate_full(
                link.reissue_move(servo_id, session.target, params.dwell_ms)
                    .map(|_| true),
                false,
            )?;
            if !sent {
                continue;
            }

            counters.reset_sub();
            head.start_telemetry();
            if !scope.pause(params.warmup()) {
                break;
            }
            if link.is_locked() {
                debug!("Move to {} still pending, resending once", session.target);
                tolerate_full(
                    link.reissue_move(servo_id, session.target, params.dwell_ms),
                    (),
                )?;
                if !scope.pause(params.warmup()) {
                    break;
                }
            }

            if !scope.pause(params.dwell()) {
                break;
            }
            head.stop_telemetry();
            tolerate_full(link.read_angle(servo_id), ())?;

            if counters.advance_emitter() {
                trace!("Continuous cycle complete, master frame {}", counters.master());
            }
        }
        Ok(())
    }

    fn run_discrete(
        &self,
        scope: &ModeScope<'_>,
        session: &mut ScanSession,
    ) -> Result<(), ControlError> {
        while scope.active() {
            if self.discrete_step(scope, session)? == WaitOutcome::Cancelled {
                break;
            }
        }
        Ok(())
    }

    /// 步进一个位置
    ///
    /// 发射管无论是否到位都在结束时关闭。
    fn discrete_step(
        &self,
        scope: &ModeScope<'_>,
        session: &mut ScanSession,
    ) -> Result<WaitOutcome, ControlError> {
        let params = scope.head.params();
        session.sweep.clamp(params.low, params.high);
        session.target = session.sweep.position();
        session.retries = 0;

        let result = match self.reach(scope, session, &params) {
            Ok(WaitOutcome::Confirmed) => self.sample(scope, session, &params),
            other => other,
        };
        scope.head.emitters_off();
        result
    }

    /// 运动到会话目标，并用读角度确认
    fn reach(
        &self,
        scope: &ModeScope<'_>,
        session: &mut ScanSession,
        params: &ControlParams,
    ) -> Result<WaitOutcome, ControlError> {
        let link = scope.head.link();
        let servo_id = scope.head.servo_id();
        let target = session.target;
        let attempts = self.config.discrete_max_attempts.max(1);

        tolerate_full(link.reissue_move(servo_id, target, params.dwell_ms), ())?;

        let mut outcome = WaitOutcome::TimedOut;
        for attempt in 1..=attempts {
            if !scope.pause(params.dwell() + params.warmup()) {
                return Ok(WaitOutcome::Cancelled);
            }
            outcome = tolerate_full(link.confirm_angle(servo_id, target), WaitOutcome::TimedOut)?;
            if outcome.is_confirmed() {
                break;
            }
            session.retries += 1;
            debug!(
                "Position {} not confirmed ({:?}), attempt {}/{}",
                target, outcome, attempt, attempts
            );
            // 每次未到位都重发，最后一次也不例外
            tolerate_full(link.reissue_move(servo_id, target, params.dwell_ms), ())?;
        }

        if !outcome.is_confirmed() {
            warn!(
                "Servo did not reach {} after {} attempts, skipping sample",
                target, attempts
            );
        }
        Ok(outcome)
    }

    /// 到位后采样：点亮发射管、等待增益稳定、上传一帧
    fn sample(
        &self,
        scope: &ModeScope<'_>,
        session: &mut ScanSession,
        params: &ControlParams,
    ) -> Result<WaitOutcome, ControlError> {
        let head = scope.head;
        let ctx = head.context();

        head.set_emitters(ctx.counters.emitter_pair());
        if !scope.pause(params.warmup()) {
            return Ok(WaitOutcome::Cancelled);
        }

        let gain_idle = head
            .link()
            .poll_until(None, &|| !scope.active(), || !ctx.gain_mutex.is_busy());
        if gain_idle != WaitOutcome::Confirmed {
            return Ok(gain_idle);
        }

        if let Err(e) = head.telemetry().emit() {
            warn!("Step telemetry at {} dropped: {}", session.target, e);
        }
        session.completed_steps += 1;

        if ctx.counters.advance_emitter() {
            session
                .sweep
                .advance(params.low, params.high, params.step);
            trace!(
                "Sweep advanced to {} ({:?})",
                session.sweep.position(),
                session.sweep.direction()
            );
        }
        Ok(WaitOutcome::Confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanhead_driver::{LinkConfig, ScanHeadBuilder};
    use scanhead_protocol::{ActuatorCommand, EmitterMask, FrameView, ModeMask, REQUEST_MAGIC};
    use scanhead_serial::{MockTransport, SerialTransport};

    fn idle_head(params: ControlParams) -> Arc<ScanHead> {
        let (actuator, _servo) = MockTransport::pair();
        let (host, _host_end) = MockTransport::pair();
        Arc::new(
            ScanHeadBuilder::new()
                .params(params)
                .build(actuator, host)
                .unwrap(),
        )
    }

    #[test]
    fn test_run_once_idle_without_mode() {
        let head = idle_head(ControlParams::default());
        let mut controller = ScanController::new(head, ControllerConfig::default());
        assert!(matches!(controller.run_once(), Ok(None)));
        assert!(controller.session().is_none());
    }

    #[test]
    fn test_run_once_rejects_conflicting_modes() {
        let params = ControlParams {
            mode_mask: 0x0005,
            ..ControlParams::default()
        };
        let head = idle_head(params);
        let mut controller = ScanController::new(head, ControllerConfig::default());
        assert!(matches!(
            controller.run_once(),
            Err(ControlError::ConflictingModes { mask: 0x0005 })
        ));
    }

    #[test]
    fn test_stopped_controller_leaves_mode_immediately() {
        let params = ControlParams {
            mode_mask: 0x0004,
            upload_rate_hz: 0,
            adjust_rate_hz: 0,
            ..ControlParams::default()
        };
        let head = idle_head(params);
        let mut controller = ScanController::new(head.clone(), ControllerConfig::default());
        controller.stop_handle().store(true, Ordering::Release);

        assert!(matches!(
            controller.run_once(),
            Ok(Some(ScanMode::Discrete))
        ));
        let session = controller.session().unwrap();
        assert_eq!(session.completed_steps, 0);
        assert_eq!(head.emitters().current(), EmitterMask::OFF);
    }

    #[test]
    fn test_reach_resends_after_every_mismatch() {
        let params = ControlParams {
            mode_mask: ModeMask::DISCRETE_BIT,
            low: 100,
            high: 900,
            dwell_ms: 1,
            warmup_ms: 0,
            upload_rate_hz: 0,
            adjust_rate_hz: 0,
            ..ControlParams::default()
        };
        let (actuator, mut servo) = MockTransport::pair();
        let (host, _host_end) = MockTransport::pair();
        let head = Arc::new(
            ScanHeadBuilder::new()
                .params(params)
                .link_config(LinkConfig {
                    poll_interval: Duration::from_millis(1),
                    reply_timeout: Duration::from_millis(10),
                })
                .build(actuator, host)
                .unwrap(),
        );
        let controller = ScanController::new(head.clone(), ControllerConfig::default());
        let stop = AtomicBool::new(false);
        let scope = ModeScope {
            head: &head,
            stop: &stop,
            mode: ScanMode::Discrete,
            epoch: head.context().mode_epoch(),
        };
        let mut session = ScanSession::new(ScanMode::Discrete, scope.epoch, 100);

        // 舵机不应答：三次确认全部超时
        let outcome = controller.reach(&scope, &mut session, &params).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(session.retries, 3);

        let mut moves = 0;
        let mut reads = 0;
        servo.set_receive_timeout(Duration::from_millis(50));
        while let Ok(bytes) = servo.receive() {
            let mut rest = bytes.as_slice();
            while let Ok(view) = FrameView::parse(rest, REQUEST_MAGIC) {
                match ActuatorCommand::try_from(view.command_id()) {
                    Ok(ActuatorCommand::SingleAngleMove) => moves += 1,
                    Ok(ActuatorCommand::ReadAngle) => reads += 1,
                    _ => {},
                }
                rest = &rest[view.frame_len().min(rest.len())..];
            }
        }
        assert_eq!(reads, 3);
        // 首次下发 + 每次未到位后的重发
        assert_eq!(moves, 4);
    }

    #[test]
    fn test_tolerate_full() {
        assert!(matches!(
            tolerate_full::<bool>(Err(DriverError::ChannelFull), false),
            Ok(false)
        ));
        assert!(matches!(
            tolerate_full::<bool>(Err(DriverError::ChannelClosed), false),
            Err(ControlError::Driver(DriverError::ChannelClosed))
        ));
        assert!(matches!(tolerate_full(Ok(true), false), Ok(true)));
    }
}
