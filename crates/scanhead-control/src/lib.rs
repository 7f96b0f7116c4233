//! 控制层模块
//!
//! - [`ScanController`]: 前台扫描循环（Debug / Continuous / Discrete）
//! - [`CommandDispatcher`]: 上位机命令分发
//! - [`ScanHeadConfig`]: TOML 配置
//!
//! # Example
//!
//! ```no_run
//! use scanhead_control::{CommandDispatcher, ScanController, ScanHeadConfig};
//! use scanhead_driver::{ScanHeadBuilder, SimulatedServo};
//! use scanhead_serial::MockTransport;
//! use std::sync::Arc;
//!
//! let config = ScanHeadConfig::default();
//! let (actuator, servo_end) = MockTransport::pair();
//! let (host, _host_end) = MockTransport::pair();
//! let _servo = SimulatedServo::spawn(servo_end, config.servo.id);
//!
//! let head = Arc::new(
//!     ScanHeadBuilder::new()
//!         .params(config.params)
//!         .link_config(config.link_config())
//!         .build(actuator, host)?,
//! );
//! let dispatcher = CommandDispatcher::new(head.clone());
//! let mut controller = ScanController::new(head, config.controller_config());
//!
//! let stop = controller.stop_handle();
//! std::thread::spawn(move || dispatcher.run(&stop));
//! controller.run();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod controller;
pub mod dispatcher;
mod error;
pub mod session;
pub mod sweep;

pub use config::{GainSection, LinkSection, ScanHeadConfig, ServoSection, TimingSection};
pub use controller::{ControllerConfig, ScanController};
pub use dispatcher::CommandDispatcher;
pub use error::ControlError;
pub use session::ScanSession;
pub use sweep::{Direction, Sweep};
