//! 驱动层模块
//!
//! 本模块提供扫描头的设备驱动功能，包括：
//! - IO 线程管理（舵机链路、上位机链路）
//! - 共享状态上下文（ArcSwap 参数快照、原子令牌与帧号）
//! - 舵机链路操作与带超时的等待
//! - 遥测构建与周期上传
//! - 增益总线、发射管等外部硬件接口
//! - 钩子系统：收发帧回调
//!
//! 扫描模式的调度逻辑在 `scanhead-control` 中。

mod builder;
mod error;
pub mod gain;
pub mod hal;
pub mod hooks;
pub mod link;
pub mod metrics;
pub mod pipeline;
mod scan_head;
pub mod sim;
pub mod state;
pub mod telemetry;
pub mod ticker;
pub mod token;
pub mod uplink;

pub use builder::ScanHeadBuilder;
pub use error::DriverError;
pub use gain::GainService;
pub use hal::{EmitterBank, Emitters, GainBus, GainPolicy, LoggingEmitters};
pub use hooks::{ChannelHook, FrameCallback, FrameDirection, HookManager};
pub use link::{ActuatorLink, LinkConfig, WaitOutcome};
pub use metrics::{LinkMetrics, MetricsSnapshot};
pub use pipeline::{PipelineConfig, actuator_io_loop, host_io_loop};
pub use scan_head::ScanHead;
pub use sim::{MemoryGainBus, SimState, SimulatedServo};
pub use state::*;
pub use telemetry::{Telemetry, build_frame};
pub use ticker::PeriodicTicker;
pub use token::{CompletionToken, TokenState};
pub use uplink::HostUplink;
