//! Builder 模式实现
//!
//! 提供链式构造 `ScanHead` 实例的便捷方式。

use crate::error::DriverError;
use crate::gain::GainService;
use crate::hal::{EmitterBank, Emitters, GainBus, GainPolicy, LoggingEmitters};
use crate::hooks::FrameCallback;
use crate::link::{ActuatorLink, LinkConfig};
use crate::metrics::LinkMetrics;
use crate::pipeline::{PipelineConfig, actuator_io_loop, host_io_loop};
use crate::scan_head::{ScanHead, ScanHeadParts};
use crate::state::ScanContext;
use crate::uplink::HostUplink;
use crossbeam_channel::bounded;
use scanhead_protocol::ControlParams;
use scanhead_serial::SerialTransport;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// 舵机请求队列容量
const ACTUATOR_QUEUE_CAPACITY: usize = 10;
/// 上行队列容量
const UPLINK_QUEUE_CAPACITY: usize = 64;
/// 上位机命令队列容量
const HOST_COMMAND_CAPACITY: usize = 16;

/// ScanHead Builder（链式构造）
///
/// # Example
///
/// ```
/// use scanhead_driver::ScanHeadBuilder;
/// use scanhead_protocol::ControlParams;
/// use scanhead_serial::MockTransport;
///
/// let (actuator, _servo_end) = MockTransport::pair();
/// let (host, _host_end) = MockTransport::pair();
///
/// let head = ScanHeadBuilder::new()
///     .servo_id(1)
///     .params(ControlParams::default())
///     .build(actuator, host)
///     .unwrap();
/// assert_eq!(head.servo_id(), 1);
/// ```
pub struct ScanHeadBuilder {
    params: ControlParams,
    servo_id: u8,
    pipeline_config: PipelineConfig,
    link_config: LinkConfig,
    emitters: Option<Box<dyn EmitterBank>>,
    gain_bus: Option<Box<dyn GainBus>>,
    gain_policy: Option<Box<dyn GainPolicy>>,
    gain_addresses: [u8; 4],
    hooks: Vec<Arc<dyn FrameCallback>>,
}

impl ScanHeadBuilder {
    pub fn new() -> Self {
        Self {
            params: ControlParams::default(),
            servo_id: 0,
            pipeline_config: PipelineConfig::default(),
            link_config: LinkConfig::default(),
            emitters: None,
            gain_bus: None,
            gain_policy: None,
            gain_addresses: [0; 4],
            hooks: Vec::new(),
        }
    }

    /// 初始运行参数
    pub fn params(mut self, params: ControlParams) -> Self {
        self.params = params;
        self
    }

    pub fn servo_id(mut self, servo_id: u8) -> Self {
        self.servo_id = servo_id;
        self
    }

    pub fn pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline_config = config;
        self
    }

    pub fn link_config(mut self, config: LinkConfig) -> Self {
        self.link_config = config;
        self
    }

    /// 发射管输出（默认只输出日志）
    pub fn emitters(mut self, bank: impl EmitterBank + 'static) -> Self {
        self.emitters = Some(Box::new(bank));
        self
    }

    pub fn gain_bus(mut self, bus: impl GainBus + 'static) -> Self {
        self.gain_bus = Some(Box::new(bus));
        self
    }

    pub fn gain_policy(mut self, policy: impl GainPolicy + 'static) -> Self {
        self.gain_policy = Some(Box::new(policy));
        self
    }

    /// 四路增益级的总线地址
    pub fn gain_addresses(mut self, addresses: [u8; 4]) -> Self {
        self.gain_addresses = addresses;
        self
    }

    pub fn hook(mut self, callback: Arc<dyn FrameCallback>) -> Self {
        self.hooks.push(callback);
        self
    }

    /// 启动 IO 线程并构建 `ScanHead`
    ///
    /// # 参数
    ///
    /// - `actuator`: 舵机串口（移动到舵机 IO 线程）
    /// - `host`: 上位机串口（移动到上位机 IO 线程）
    ///
    /// # 错误
    ///
    /// IO 线程创建失败时返回 `DriverError::IoThread`。
    pub fn build(
        self,
        actuator: impl SerialTransport + Send + 'static,
        host: impl SerialTransport + Send + 'static,
    ) -> Result<ScanHead, DriverError> {
        let ctx = Arc::new(ScanContext::new(self.params));
        {
            let mut hooks = ctx.hooks.write();
            for hook in self.hooks {
                hooks.add_callback(hook);
            }
        }

        let metrics = Arc::new(LinkMetrics::new());
        let is_running = Arc::new(AtomicBool::new(true));

        let (actuator_tx, actuator_rx) = bounded(ACTUATOR_QUEUE_CAPACITY);
        let (uplink_tx, uplink_rx) = bounded(UPLINK_QUEUE_CAPACITY);
        let (command_tx, command_rx) = bounded(HOST_COMMAND_CAPACITY);

        let uplink = HostUplink::new(uplink_tx, metrics.clone());
        let link = ActuatorLink::new(actuator_tx, ctx.clone(), self.link_config);

        let actuator_thread = {
            let ctx = ctx.clone();
            let uplink = uplink.clone();
            let config = self.pipeline_config;
            let is_running = is_running.clone();
            let metrics = metrics.clone();
            thread::Builder::new()
                .name("scanhead-actuator".into())
                .spawn(move || {
                    actuator_io_loop(actuator, actuator_rx, ctx, uplink, config, is_running, metrics)
                })
                .map_err(|e| DriverError::IoThread(e.to_string()))?
        };

        let host_thread = {
            let config = self.pipeline_config;
            let thread_running = is_running.clone();
            let metrics = metrics.clone();
            thread::Builder::new()
                .name("scanhead-host".into())
                .spawn(move || {
                    host_io_loop(host, uplink_rx, command_tx, config, thread_running, metrics)
                })
                .map_err(|e| {
                    // 已启动的舵机线程随运行标志退出
                    is_running.store(false, Ordering::Release);
                    DriverError::IoThread(e.to_string())
                })?
        };

        let bank: Box<dyn EmitterBank> = match self.emitters {
            Some(bank) => bank,
            None => Box::new(LoggingEmitters::default()),
        };
        let mut emitters = Emitters::new(bank, ctx.clone());
        emitters.all_off();

        let gain = Arc::new(GainService::new(
            ctx.clone(),
            self.gain_bus,
            self.gain_policy,
            self.gain_addresses,
        ));

        Ok(ScanHead::from_parts(ScanHeadParts {
            ctx,
            servo_id: self.servo_id,
            link,
            uplink,
            emitters,
            gain,
            host_commands: command_rx,
            actuator_thread,
            host_thread,
            is_running,
            metrics,
        }))
    }
}

impl Default for ScanHeadBuilder {
    fn default() -> Self {
        Self::new()
    }
}
