//! 外部硬件协作接口
//!
//! - [`EmitterBank`]: 每路发射管一个数字输出
//! - [`GainBus`]: 增益调节总线（读一字节 / 写两字节）
//! - [`GainPolicy`]: 周期增益调节策略

use crate::error::DriverError;
use crate::state::{SampleSet, ScanContext};
use scanhead_protocol::{EMITTER_LINES, EmitterMask};
use std::sync::Arc;
use tracing::{trace, warn};

/// 发射管数字输出
pub trait EmitterBank: Send {
    /// 设置第 `line` 路（0 起）输出
    fn set_line(&mut self, line: usize, on: bool) -> Result<(), DriverError>;
}

/// 增益调节总线
pub trait GainBus: Send {
    fn read_byte(&mut self, address: u8) -> Result<u8, DriverError>;

    fn write_pair(&mut self, address: u8, data: [u8; 2]) -> Result<(), DriverError>;
}

/// 周期增益调节策略
///
/// 在增益调节周期内被调用，调用期间增益互斥位保持置位。
pub trait GainPolicy: Send {
    fn adjust(
        &mut self,
        samples: &SampleSet,
        bus: &mut dyn GainBus,
        addresses: &[u8; 4],
    ) -> Result<(), DriverError>;
}

/// 只输出日志的发射管（无 GPIO 的主机环境）
#[derive(Debug, Default)]
pub struct LoggingEmitters {
    lines: [bool; EMITTER_LINES],
}

impl EmitterBank for LoggingEmitters {
    fn set_line(&mut self, line: usize, on: bool) -> Result<(), DriverError> {
        if let Some(slot) = self.lines.get_mut(line)
            && *slot != on
        {
            *slot = on;
            trace!("emitter line {} -> {}", line + 1, if on { "on" } else { "off" });
        }
        Ok(())
    }
}

/// 发射管输出
///
/// 驱动硬件输出并把当前掩码写入共享上下文，遥测帧据此上报。
pub struct Emitters {
    bank: Box<dyn EmitterBank>,
    ctx: Arc<ScanContext>,
}

impl Emitters {
    pub fn new(bank: Box<dyn EmitterBank>, ctx: Arc<ScanContext>) -> Self {
        Self { bank, ctx }
    }

    /// 按掩码设置全部发射管
    ///
    /// 单路输出失败只记录日志，其余路继续设置。
    pub fn apply(&mut self, mask: EmitterMask) {
        for line in 0..EMITTER_LINES {
            if let Err(e) = self.bank.set_line(line, mask.is_on(line)) {
                warn!("Failed to drive emitter line {}: {}", line + 1, e);
            }
        }
        self.ctx.set_emitter_lines(mask);
    }

    pub fn all_off(&mut self) {
        self.apply(EmitterMask::OFF);
    }

    pub fn current(&self) -> EmitterMask {
        self.ctx.emitter_lines()
    }
}
