//! 遥测帧构建与上传

use crate::error::DriverError;
use crate::state::{SampleSet, ScanContext};
use crate::uplink::HostUplink;
use scanhead_protocol::{EmitterMask, TelemetryFrame};
use std::sync::Arc;

/// 由采样数组与计数器组装一帧遥测（纯函数）
pub fn build_frame(
    samples: &SampleSet,
    master_frame: u16,
    sub_frame: u16,
    emitters: EmitterMask,
) -> TelemetryFrame {
    TelemetryFrame {
        generic: samples.generic,
        precision: samples.precision,
        gain: samples.gain,
        master_frame,
        sub_frame,
        emitter_mask: emitters.bits(),
    }
}

/// 遥测服务
///
/// 周期上传（每次先递增子帧号）与扫描过程中的即时上传共用同一个构建器，
/// 两者不互斥。
#[derive(Clone)]
pub struct Telemetry {
    ctx: Arc<ScanContext>,
    uplink: HostUplink,
}

impl Telemetry {
    pub(crate) fn new(ctx: Arc<ScanContext>, uplink: HostUplink) -> Self {
        Self { ctx, uplink }
    }

    /// 用当前采样、帧号与发射管状态构建一帧
    pub fn build(&self) -> TelemetryFrame {
        let counters = &self.ctx.counters;
        build_frame(
            &self.ctx.samples.load(),
            counters.master(),
            counters.sub(),
            self.ctx.emitter_lines(),
        )
    }

    /// 即时上传一帧
    pub fn emit(&self) -> Result<TelemetryFrame, DriverError> {
        let frame = self.build();
        self.uplink.send_telemetry(&frame)?;
        Ok(frame)
    }

    /// 周期上传：子帧号加一后上传
    pub fn tick(&self) -> Result<TelemetryFrame, DriverError> {
        self.ctx.counters.next_sub();
        self.emit()
    }
}
