//! 增益总线服务
//!
//! 调试读写与周期增益调节都在持有增益互斥位期间执行总线事务。

use crate::error::DriverError;
use crate::hal::{GainBus, GainPolicy};
use crate::state::ScanContext;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// 等待增益互斥位释放的上限
const GAIN_HOLD_TIMEOUT: Duration = Duration::from_millis(100);

/// 增益总线服务
pub struct GainService {
    ctx: Arc<ScanContext>,
    bus: Mutex<Option<Box<dyn GainBus>>>,
    policy: Mutex<Option<Box<dyn GainPolicy>>>,
    addresses: [u8; 4],
}

impl GainService {
    pub fn new(
        ctx: Arc<ScanContext>,
        bus: Option<Box<dyn GainBus>>,
        policy: Option<Box<dyn GainPolicy>>,
        addresses: [u8; 4],
    ) -> Self {
        Self {
            ctx,
            bus: Mutex::new(bus),
            policy: Mutex::new(policy),
            addresses,
        }
    }

    pub fn addresses(&self) -> [u8; 4] {
        self.addresses
    }

    /// 读取第 `index` 路增益设置
    ///
    /// # 错误
    ///
    /// - `DriverError::GainBus`: 下标越界或总线事务失败
    /// - `DriverError::NoGainBus`: 未配置总线
    /// - `DriverError::Timeout`: 增益互斥位一直被占用
    pub fn read(&self, index: u8) -> Result<u8, DriverError> {
        let address = self.address(index)?;
        self.with_bus(|bus| bus.read_byte(address))
    }

    /// 写入第 `index` 路增益设置
    pub fn write(&self, index: u8, data: [u8; 2]) -> Result<(), DriverError> {
        let address = self.address(index)?;
        self.with_bus(|bus| bus.write_pair(address, data))
    }

    /// 周期增益调节
    ///
    /// 互斥位已被占用时跳过本周期。
    pub fn adjust(&self) -> Result<(), DriverError> {
        let mut policy = self.policy.lock();
        let Some(policy) = policy.as_mut() else {
            return Ok(());
        };
        let Some(_guard) = self.ctx.gain_mutex.try_hold() else {
            trace!("Gain bus busy, skipping adjust cycle");
            return Ok(());
        };
        let mut bus = self.bus.lock();
        let bus = bus.as_mut().ok_or(DriverError::NoGainBus)?;
        let samples = self.ctx.samples.load();
        policy.adjust(&samples, &mut **bus, &self.addresses)
    }

    fn address(&self, index: u8) -> Result<u8, DriverError> {
        self.addresses
            .get(index as usize)
            .copied()
            .ok_or_else(|| DriverError::GainBus(format!("no gain stage at index {}", index)))
    }

    fn with_bus<T>(
        &self,
        f: impl FnOnce(&mut dyn GainBus) -> Result<T, DriverError>,
    ) -> Result<T, DriverError> {
        let start = Instant::now();
        let _guard = loop {
            if let Some(guard) = self.ctx.gain_mutex.try_hold() {
                break guard;
            }
            if start.elapsed() > GAIN_HOLD_TIMEOUT {
                warn!("Gain mutex held for more than {:?}", GAIN_HOLD_TIMEOUT);
                return Err(DriverError::Timeout);
            }
            spin_sleep::sleep(Duration::from_micros(200));
        };
        let mut bus = self.bus.lock();
        let bus = bus.as_mut().ok_or(DriverError::NoGainBus)?;
        f(&mut **bus)
    }
}
