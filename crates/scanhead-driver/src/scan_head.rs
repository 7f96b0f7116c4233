//! ScanHead 对外 API
//!
//! 拥有共享状态上下文、两个 IO 线程与两个周期触发器。
//! 扫描控制器与命令分发器都通过它访问舵机链路、遥测与增益总线。

use crate::gain::GainService;
use crate::hal::Emitters;
use crate::hooks::FrameCallback;
use crate::link::ActuatorLink;
use crate::metrics::{LinkMetrics, MetricsSnapshot};
use crate::state::{SampleSet, ScanContext};
use crate::telemetry::Telemetry;
use crate::ticker::PeriodicTicker;
use crate::uplink::HostUplink;
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, MutexGuard};
use scanhead_protocol::{ControlParams, EmitterMask};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{error, info};

/// 带超时的线程 join
pub(crate) trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();
        // 由看门狗线程 join，本线程只等待信号
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::other(
                "Watchdog thread disconnected",
            ))),
        }
    }
}

/// 构建好的各部件（由 Builder 组装）
pub(crate) struct ScanHeadParts {
    pub ctx: Arc<ScanContext>,
    pub servo_id: u8,
    pub link: ActuatorLink,
    pub uplink: HostUplink,
    pub emitters: Emitters,
    pub gain: Arc<GainService>,
    pub host_commands: Receiver<Vec<u8>>,
    pub actuator_thread: JoinHandle<()>,
    pub host_thread: JoinHandle<()>,
    pub is_running: Arc<AtomicBool>,
    pub metrics: Arc<LinkMetrics>,
}

/// 扫描头驱动
pub struct ScanHead {
    ctx: Arc<ScanContext>,
    servo_id: u8,
    link: ActuatorLink,
    uplink: HostUplink,
    telemetry: Telemetry,
    emitters: Mutex<Emitters>,
    gain: Arc<GainService>,
    host_commands: Receiver<Vec<u8>>,
    telemetry_ticker: PeriodicTicker,
    gain_ticker: PeriodicTicker,
    actuator_thread: Option<JoinHandle<()>>,
    host_thread: Option<JoinHandle<()>>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<LinkMetrics>,
}

impl ScanHead {
    pub(crate) fn from_parts(parts: ScanHeadParts) -> Self {
        let telemetry = Telemetry::new(parts.ctx.clone(), parts.uplink.clone());

        let tick_telemetry = telemetry.clone();
        let telemetry_ticker = PeriodicTicker::spawn("telemetry", move || {
            if let Err(e) = tick_telemetry.tick() {
                tracing::debug!("Periodic telemetry dropped: {}", e);
            }
        });

        let tick_gain = parts.gain.clone();
        let gain_ticker = PeriodicTicker::spawn("gain-adjust", move || {
            if let Err(e) = tick_gain.adjust() {
                tracing::warn!("Gain adjust cycle failed: {}", e);
            }
        });

        let head = Self {
            ctx: parts.ctx,
            servo_id: parts.servo_id,
            link: parts.link,
            uplink: parts.uplink,
            telemetry,
            emitters: Mutex::new(parts.emitters),
            gain: parts.gain,
            host_commands: parts.host_commands,
            telemetry_ticker,
            gain_ticker,
            actuator_thread: Some(parts.actuator_thread),
            host_thread: Some(parts.host_thread),
            is_running: parts.is_running,
            metrics: parts.metrics,
        };
        head.restart_ticks();
        if matches!(head.ctx.params().scan_mode(), Ok(None)) {
            head.start_telemetry();
        }
        head
    }

    pub fn context(&self) -> &Arc<ScanContext> {
        &self.ctx
    }

    /// 配置的舵机 ID
    pub fn servo_id(&self) -> u8 {
        self.servo_id
    }

    pub fn link(&self) -> &ActuatorLink {
        &self.link
    }

    pub fn uplink(&self) -> &HostUplink {
        &self.uplink
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn gain(&self) -> &GainService {
        &self.gain
    }

    /// 上位机命令缓冲（由分发器消费）
    pub fn host_commands(&self) -> &Receiver<Vec<u8>> {
        &self.host_commands
    }

    pub fn params(&self) -> ControlParams {
        self.ctx.params()
    }

    /// IO 线程是否仍在运行
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 发射管输出
    pub fn emitters(&self) -> MutexGuard<'_, Emitters> {
        self.emitters.lock()
    }

    pub fn set_emitters(&self, mask: EmitterMask) {
        self.emitters.lock().apply(mask);
    }

    pub fn emitters_off(&self) {
        self.emitters.lock().all_off();
    }

    /// 替换外部采样数组
    pub fn publish_samples(&self, samples: SampleSet) {
        self.ctx.samples.store(Arc::new(samples));
    }

    pub fn add_hook(&self, callback: Arc<dyn FrameCallback>) {
        self.ctx.hooks.write().add_callback(callback);
    }

    /// 按当前上传速率启动周期遥测（速率为 0 时停止）
    pub fn start_telemetry(&self) {
        self.telemetry_ticker.restart(self.ctx.params().upload_period());
    }

    pub fn stop_telemetry(&self) {
        self.telemetry_ticker.stop();
    }

    pub fn telemetry_running(&self) -> bool {
        self.telemetry_ticker.is_running()
    }

    /// 按当前速率重新计算两个周期
    ///
    /// 周期遥测只在运行中时重启；增益调节速率非 0 即运行。
    pub fn restart_ticks(&self) {
        let params = self.ctx.params();
        self.telemetry_ticker.reconfigure(params.upload_period());
        self.gain_ticker.restart(params.adjust_period());
    }

    /// 模式复位
    ///
    /// 停止周期遥测，释放完成令牌，清零发射管子步与两个帧号。
    /// 没有选中扫描模式时重新开始空闲遥测。
    pub fn reset_mode(&self) {
        self.stop_telemetry();
        self.link.release();
        self.ctx.counters.reset();
        let epoch = self.ctx.bump_mode_epoch();

        let params = self.ctx.params();
        info!(
            "Mode reset (epoch {}), mode mask {:#06x}",
            epoch, params.mode_mask
        );
        if matches!(params.scan_mode(), Ok(None)) {
            self.start_telemetry();
        }
    }
}

impl Drop for ScanHead {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        self.telemetry_ticker.stop();
        self.gain_ticker.stop();
        self.emitters.lock().all_off();

        let join_timeout = Duration::from_secs(2);

        if let Some(handle) = self.actuator_thread.take()
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "Actuator IO thread panicked or failed to shut down within {:?}",
                join_timeout
            );
        }

        if let Some(handle) = self.host_thread.take()
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "Host IO thread panicked or failed to shut down within {:?}",
                join_timeout
            );
        }
    }
}
