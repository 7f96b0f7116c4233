//! 周期触发线程
//!
//! 每个 `PeriodicTicker` 独占一个线程，按设定周期调用任务闭包。
//! 启动、停止、改周期都通过控制 channel 下发；已在运行时再次启动等同于
//! 先停止再以新周期重新开始（相位从启动时刻重新计算）。

use crate::scan_head::JoinTimeout;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{error, trace};

enum TickerCommand {
    Start(Duration),
    Stop,
}

/// 周期触发器
pub struct PeriodicTicker {
    name: &'static str,
    ctrl: Option<Sender<TickerCommand>>,
    running: Arc<AtomicBool>,
    period: Mutex<Option<Duration>>,
    thread: Option<JoinHandle<()>>,
}

impl PeriodicTicker {
    /// 创建触发器（初始为停止状态）
    ///
    /// # 参数
    ///
    /// - `name`: 日志中使用的名称
    /// - `task`: 每个周期调用一次
    pub fn spawn(name: &'static str, task: impl FnMut() + Send + 'static) -> Self {
        let (ctrl_tx, ctrl_rx) = unbounded();
        let thread = spawn(move || ticker_loop(name, ctrl_rx, task));
        Self {
            name,
            ctrl: Some(ctrl_tx),
            running: Arc::new(AtomicBool::new(false)),
            period: Mutex::new(None),
            thread: Some(thread),
        }
    }

    /// 以指定周期启动（已运行时重新开始）
    pub fn start(&self, period: Duration) {
        *self.period.lock() = Some(period);
        self.running.store(true, Ordering::Release);
        self.send(TickerCommand::Start(period));
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.send(TickerCommand::Stop);
    }

    /// 停止后按新周期重启；`None` 表示保持停止
    pub fn restart(&self, period: Option<Duration>) {
        self.stop();
        if let Some(period) = period {
            self.start(period);
        }
    }

    /// 更新周期，仅在运行中时重启
    pub fn reconfigure(&self, period: Option<Duration>) {
        if self.is_running() {
            self.restart(period);
        } else {
            *self.period.lock() = period;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 最近一次设置的周期
    pub fn period(&self) -> Option<Duration> {
        *self.period.lock()
    }

    fn send(&self, command: TickerCommand) {
        if let Some(ctrl) = &self.ctrl
            && ctrl.send(command).is_err()
        {
            error!("{} ticker thread is gone", self.name);
        }
    }
}

impl Drop for PeriodicTicker {
    fn drop(&mut self) {
        // 关闭控制 channel，线程收到 Disconnected 后退出
        self.ctrl.take();
        if let Some(handle) = self.thread.take()
            && handle.join_timeout(Duration::from_secs(2)).is_err()
        {
            error!("{} ticker thread failed to shut down", self.name);
        }
    }
}

fn ticker_loop(name: &'static str, ctrl: Receiver<TickerCommand>, mut task: impl FnMut()) {
    let mut period: Option<Duration> = None;
    let mut next_tick = Instant::now();

    loop {
        let command = match period {
            None => match ctrl.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
            Some(p) => {
                let now = Instant::now();
                if now >= next_tick {
                    task();
                    next_tick += p;
                    // 任务耗时超过一个周期时不追赶
                    if next_tick < now {
                        next_tick = now + p;
                    }
                    continue;
                }
                match ctrl.recv_timeout(next_tick - now) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            },
        };

        match command {
            TickerCommand::Start(p) => {
                trace!("{} ticker started, period {:?}", name, p);
                period = Some(p);
                next_tick = Instant::now() + p;
            },
            TickerCommand::Stop => {
                trace!("{} ticker stopped", name);
                period = None;
            },
        }
    }
    trace!("{} ticker thread exiting", name);
}
