//! 命令定义和实现

pub mod config;
pub mod monitor;
pub mod ports;
pub mod run;
pub mod send;
pub mod simulate;

pub use config::ConfigCommand;
pub use monitor::MonitorCommand;
pub use run::RunCommand;
pub use send::SendCommand;
pub use simulate::SimulateCommand;
