//! 舵机链路
//!
//! 通过 IO 线程的发送队列向舵机发出请求。应答由 IO 线程解码并写入
//! [`ScanContext`]：读角度应答更新最近角度并释放完成令牌，运动应答
//! 在成功时释放令牌，其余应答原样转发给上位机。
//!
//! 同一时刻最多只有一个运动事务：[`ActuatorLink::move_to`] 用 CAS 占用
//! 完成令牌，令牌已处于 Locked 时返回 [`DriverError::TransactionPending`]。

use crate::error::DriverError;
use crate::state::ScanContext;
use crate::token::TokenState;
use crossbeam_channel::{Sender, TrySendError};
use scanhead_protocol::{ActuatorRequest, FrameBytes};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// 等待结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// 条件满足
    Confirmed,
    /// 超时仍未满足
    TimedOut,
    /// 收到应答，但值与期望不符
    Mismatched,
    /// 等待被调用方取消（模式切换或停止）
    Cancelled,
}

impl WaitOutcome {
    pub fn is_confirmed(self) -> bool {
        self == WaitOutcome::Confirmed
    }
}

/// 链路时序配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// 轮询间隔
    pub poll_interval: Duration,
    /// 单次读角度等待应答的时间
    pub reply_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            reply_timeout: Duration::from_millis(50),
        }
    }
}

/// 舵机链路句柄（可克隆，共享同一发送队列）
#[derive(Clone)]
pub struct ActuatorLink {
    tx: Sender<FrameBytes>,
    ctx: Arc<ScanContext>,
    config: LinkConfig,
}

impl ActuatorLink {
    pub(crate) fn new(tx: Sender<FrameBytes>, ctx: Arc<ScanContext>, config: LinkConfig) -> Self {
        Self { tx, ctx, config }
    }

    pub fn config(&self) -> LinkConfig {
        self.config
    }

    /// 通讯检测（应答转发给上位机）
    pub fn ping(&self, servo_id: u8) -> Result<(), DriverError> {
        self.send(ActuatorRequest::Ping { servo_id })
    }

    /// 单圈角度控制
    ///
    /// 先占用完成令牌再发送；发送失败时归还令牌。
    ///
    /// # 参数
    ///
    /// - `angle`: 目标角度（0.1°）
    /// - `duration_ms`: 运动时间
    ///
    /// # 错误
    ///
    /// - `DriverError::TransactionPending`: 上一个事务尚未完成
    /// - `DriverError::ChannelFull` / `ChannelClosed`: 发送队列不可用
    pub fn move_to(&self, servo_id: u8, angle: i16, duration_ms: u16) -> Result<(), DriverError> {
        let token = &self.ctx.servo.token;
        if !token.try_lock() {
            return Err(DriverError::TransactionPending);
        }

        let request = ActuatorRequest::Move {
            servo_id,
            angle,
            duration_ms,
        };
        self.ctx.servo.set_pending_move(Some(request));
        if let Err(e) = self.send(request) {
            token.release();
            return Err(e);
        }
        Ok(())
    }

    /// 重发运动请求
    ///
    /// 令牌仍处于 Locked 时把未完成的事务原样重发（不新建事务）；
    /// 令牌已释放时等同于 [`move_to`](Self::move_to)。
    pub fn reissue_move(
        &self,
        servo_id: u8,
        angle: i16,
        duration_ms: u16,
    ) -> Result<(), DriverError> {
        let request = ActuatorRequest::Move {
            servo_id,
            angle,
            duration_ms,
        };
        let token = &self.ctx.servo.token;
        if token.is_locked() && self.ctx.servo.pending_move() == Some(request) {
            trace!("Reissuing pending move to {}", angle);
            return self.send(request);
        }
        if token.is_locked() {
            // 挂起的是另一个目标：放弃旧事务
            token.compare_exchange(TokenState::Locked, TokenState::Released);
        }
        self.move_to(servo_id, angle, duration_ms)
    }

    /// 读角度（应答更新最近角度）
    pub fn read_angle(&self, servo_id: u8) -> Result<(), DriverError> {
        self.send(ActuatorRequest::ReadAngle { servo_id })
    }

    /// 读数据（应答转发给上位机）
    pub fn read_metric(&self, servo_id: u8, metric: u8) -> Result<(), DriverError> {
        self.send(ActuatorRequest::DataRead { servo_id, metric })
    }

    /// 数据监控（应答转发给上位机）
    pub fn monitor(&self, servo_id: u8, metric: u8) -> Result<(), DriverError> {
        self.send(ActuatorRequest::Monitor { servo_id, metric })
    }

    /// 最近一次读到的角度
    pub fn last_angle(&self) -> i16 {
        self.ctx.servo.last_angle()
    }

    pub fn is_locked(&self) -> bool {
        self.ctx.servo.token.is_locked()
    }

    /// 释放完成令牌（模式复位）
    pub fn release(&self) {
        self.ctx.servo.token.release();
        self.ctx.servo.set_pending_move(None);
    }

    /// 等待完成令牌释放
    ///
    /// # 参数
    ///
    /// - `timeout`: `None` 表示不限时（仍可取消）
    /// - `cancel`: 每次轮询检查，返回 true 时结束等待
    pub fn wait_released(
        &self,
        timeout: Option<Duration>,
        cancel: &dyn Fn() -> bool,
    ) -> WaitOutcome {
        self.poll_until(timeout, cancel, || !self.ctx.servo.token.is_locked())
    }

    /// 发出一次读角度并等待新的应答
    ///
    /// # 返回
    ///
    /// 在 `reply_timeout` 内收到应答时返回角度，否则返回 `None`。
    pub fn read_angle_reply(&self, servo_id: u8) -> Result<Option<i16>, DriverError> {
        let before = self.ctx.servo.angle_reports();
        self.read_angle(servo_id)?;
        let outcome = self.poll_until(Some(self.config.reply_timeout), &|| false, || {
            self.ctx.servo.angle_reports() != before
        });
        Ok(outcome
            .is_confirmed()
            .then(|| self.ctx.servo.last_angle()))
    }

    /// 读一次角度并与目标比较
    pub fn confirm_angle(&self, servo_id: u8, target: i16) -> Result<WaitOutcome, DriverError> {
        Ok(match self.read_angle_reply(servo_id)? {
            Some(angle) if angle == target => WaitOutcome::Confirmed,
            Some(angle) => {
                trace!("Angle {} does not match target {}", angle, target);
                WaitOutcome::Mismatched
            },
            None => WaitOutcome::TimedOut,
        })
    }

    /// 反复读角度直到 `accept` 接受读到的值
    ///
    /// 发送队列暂满时跳过本轮，下一轮重试。
    ///
    /// # 参数
    ///
    /// - `timeout`: `None` 表示不限时（仍可取消）
    ///
    /// # 错误
    ///
    /// 只有发送队列关闭（IO 线程退出）时返回 `Err`。
    pub fn wait_for_angle(
        &self,
        servo_id: u8,
        accept: impl Fn(i16) -> bool,
        timeout: Option<Duration>,
        cancel: &dyn Fn() -> bool,
    ) -> Result<WaitOutcome, DriverError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if cancel() {
                return Ok(WaitOutcome::Cancelled);
            }
            match self.read_angle_reply(servo_id) {
                Ok(Some(angle)) if accept(angle) => return Ok(WaitOutcome::Confirmed),
                Ok(_) => {},
                Err(DriverError::ChannelFull) => {
                    warn!("Actuator queue full while polling angle");
                },
                Err(e) => return Err(e),
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(WaitOutcome::TimedOut);
            }
            spin_sleep::sleep(self.config.poll_interval);
        }
    }

    /// 按轮询间隔检查 `done`，直到满足、取消或超时
    pub fn poll_until(
        &self,
        timeout: Option<Duration>,
        cancel: &dyn Fn() -> bool,
        mut done: impl FnMut() -> bool,
    ) -> WaitOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        // 应答等待用更细的步长，避免把整段轮询间隔都耗在一次读角度上
        let step = self.config.poll_interval.min(Duration::from_millis(1));
        let interval = if timeout.is_some_and(|t| t <= self.config.reply_timeout) {
            step
        } else {
            self.config.poll_interval
        };
        loop {
            if done() {
                return WaitOutcome::Confirmed;
            }
            if cancel() {
                return WaitOutcome::Cancelled;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return WaitOutcome::TimedOut;
            }
            spin_sleep::sleep(interval);
        }
    }

    fn send(&self, request: ActuatorRequest) -> Result<(), DriverError> {
        trace!("Queueing actuator request {:?}", request);
        self.tx.try_send(request.to_frame()).map_err(|e| match e {
            TrySendError::Full(_) => DriverError::ChannelFull,
            TrySendError::Disconnected(_) => DriverError::ChannelClosed,
        })
    }
}
