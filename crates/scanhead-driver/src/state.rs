//! 共享状态上下文
//!
//! 前台扫描循环、周期上传线程、舵机接收线程与命令分发线程共享的状态。
//! 每个字段自带同步：参数与采样数组使用 `ArcSwap`（整体替换、无锁读取），
//! 令牌、角度与帧号使用原子变量。

use crate::hooks::HookManager;
use crate::token::CompletionToken;
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use scanhead_protocol::{ActuatorRequest, ControlParams, EMITTER_TABLE, EmitterMask};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU8, AtomicU16, AtomicU32, Ordering};

/// 外部模拟前端维护的采样数组
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleSet {
    pub generic: [u16; 4],
    pub precision: [i16; 8],
    pub gain: [u8; 8],
}

/// 舵机状态
#[derive(Debug, Default)]
pub struct ServoState {
    /// 完成令牌
    pub token: CompletionToken,
    last_angle: AtomicI16,
    /// 读角度应答计数（用于等待"新的"应答）
    angle_reports: AtomicU32,
    /// 最近一次运动请求（重发同一事务时使用）
    pending_move: Mutex<Option<ActuatorRequest>>,
}

impl ServoState {
    /// 最近一次读到的角度（0.1°）
    pub fn last_angle(&self) -> i16 {
        self.last_angle.load(Ordering::Acquire)
    }

    pub fn angle_reports(&self) -> u32 {
        self.angle_reports.load(Ordering::Acquire)
    }

    /// 记录读角度应答
    pub fn record_angle(&self, angle: i16) {
        self.last_angle.store(angle, Ordering::Release);
        self.angle_reports.fetch_add(1, Ordering::AcqRel);
    }

    pub fn pending_move(&self) -> Option<ActuatorRequest> {
        *self.pending_move.lock()
    }

    pub(crate) fn set_pending_move(&self, request: Option<ActuatorRequest>) {
        *self.pending_move.lock() = request;
    }
}

/// 遥测帧号与发射管子步索引
#[derive(Debug, Default)]
pub struct FrameCounters {
    master: AtomicU16,
    sub: AtomicU16,
    emitter_index: AtomicU8,
}

impl FrameCounters {
    pub fn master(&self) -> u16 {
        self.master.load(Ordering::Acquire)
    }

    pub fn sub(&self) -> u16 {
        self.sub.load(Ordering::Acquire)
    }

    pub fn emitter_index(&self) -> u8 {
        self.emitter_index.load(Ordering::Acquire)
    }

    /// 子帧号加一，返回新值
    pub fn next_sub(&self) -> u16 {
        self.sub.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    pub fn reset_sub(&self) {
        self.sub.store(0, Ordering::Release);
    }

    /// 当前子步的发射管组合
    pub fn emitter_pair(&self) -> EmitterMask {
        EmitterMask::for_index(self.emitter_index())
    }

    /// 子步索引按 4 取模前进
    ///
    /// # 返回
    ///
    /// 回绕到 0 时返回 true，此时主帧号加一。
    pub fn advance_emitter(&self) -> bool {
        let next = (self.emitter_index() as usize + 1) % EMITTER_TABLE.len();
        self.emitter_index.store(next as u8, Ordering::Release);
        if next == 0 {
            self.master.fetch_add(1, Ordering::AcqRel);
            true
        } else {
            false
        }
    }

    /// 清零子步索引与两个帧号
    pub fn reset(&self) {
        self.emitter_index.store(0, Ordering::Release);
        self.master.store(0, Ordering::Release);
        self.sub.store(0, Ordering::Release);
    }
}

/// 增益调节互斥位
///
/// 增益总线事务进行期间置位。需要读取稳定增益的一方轮询等待释放，不与事务竞争。
#[derive(Debug, Default)]
pub struct GainMutex {
    busy: AtomicBool,
}

/// 持有期间增益互斥位保持置位
#[derive(Debug)]
pub struct GainGuard<'a> {
    mutex: &'a GainMutex,
}

impl GainMutex {
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// 尝试占用，已被占用时返回 `None`
    pub fn try_hold(&self) -> Option<GainGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GainGuard { mutex: self })
    }
}

impl Drop for GainGuard<'_> {
    fn drop(&mut self) {
        self.mutex.busy.store(false, Ordering::Release);
    }
}

/// 共享状态上下文
pub struct ScanContext {
    /// 运行参数（仅命令分发器写入）
    pub params: ArcSwap<ControlParams>,
    pub servo: ServoState,
    pub counters: FrameCounters,
    /// 外部采样数组
    pub samples: ArcSwap<SampleSet>,
    pub gain_mutex: GainMutex,
    /// 当前输出到发射管的掩码（遥测上报）
    emitter_lines: AtomicU8,
    /// 模式复位次数；扫描循环据此发现模式被重新写入
    mode_epoch: AtomicU32,
    /// 舵机链路帧钩子（IO 线程中 `try_read`）
    pub hooks: RwLock<HookManager>,
}

impl ScanContext {
    pub fn new(params: ControlParams) -> Self {
        Self {
            params: ArcSwap::from_pointee(params),
            servo: ServoState::default(),
            counters: FrameCounters::default(),
            samples: ArcSwap::from_pointee(SampleSet::default()),
            gain_mutex: GainMutex::default(),
            emitter_lines: AtomicU8::new(0),
            mode_epoch: AtomicU32::new(0),
            hooks: RwLock::new(HookManager::new()),
        }
    }

    /// 当前参数快照
    pub fn params(&self) -> ControlParams {
        **self.params.load()
    }

    /// 基于当前参数修改并整体替换
    ///
    /// 只有命令分发器写参数，读-改-写之间没有并发写者。
    pub fn update_params(&self, f: impl FnOnce(&mut ControlParams)) -> ControlParams {
        let mut params = self.params();
        f(&mut params);
        self.params.store(Arc::new(params));
        params
    }

    pub fn emitter_lines(&self) -> EmitterMask {
        EmitterMask::from_bits(self.emitter_lines.load(Ordering::Acquire))
    }

    pub(crate) fn set_emitter_lines(&self, mask: EmitterMask) {
        self.emitter_lines.store(mask.bits(), Ordering::Release);
    }

    pub fn mode_epoch(&self) -> u32 {
        self.mode_epoch.load(Ordering::Acquire)
    }

    pub(crate) fn bump_mode_epoch(&self) -> u32 {
        self.mode_epoch.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }
}

impl Default for ScanContext {
    fn default() -> Self {
        Self::new(ControlParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitter_cycle_increments_master_once() {
        let counters = FrameCounters::default();
        let wraps: Vec<bool> = (0..4).map(|_| counters.advance_emitter()).collect();
        assert_eq!(wraps, vec![false, false, false, true]);
        assert_eq!(counters.emitter_index(), 0);
        assert_eq!(counters.master(), 1);
    }

    #[test]
    fn test_emitter_pair_follows_index() {
        let counters = FrameCounters::default();
        assert_eq!(counters.emitter_pair(), EmitterMask::OFF);
        counters.advance_emitter();
        assert_eq!(counters.emitter_pair().bits(), 0x01);
    }

    #[test]
    fn test_counters_reset() {
        let counters = FrameCounters::default();
        counters.advance_emitter();
        assert_eq!(counters.next_sub(), 1);
        assert_eq!(counters.next_sub(), 2);
        counters.reset();
        assert_eq!(counters.emitter_index(), 0);
        assert_eq!(counters.master(), 0);
        assert_eq!(counters.sub(), 0);
    }

    #[test]
    fn test_record_angle_counts_reports() {
        let servo = ServoState::default();
        let before = servo.angle_reports();
        servo.record_angle(100);
        assert_eq!(servo.last_angle(), 100);
        assert_eq!(servo.angle_reports(), before + 1);
    }

    #[test]
    fn test_gain_mutex_guard() {
        let mutex = GainMutex::default();
        {
            let _guard = mutex.try_hold().unwrap();
            assert!(mutex.is_busy());
            assert!(mutex.try_hold().is_none());
        }
        assert!(!mutex.is_busy());
    }

    #[test]
    fn test_update_params() {
        let ctx = ScanContext::default();
        let updated = ctx.update_params(|p| p.step = 100);
        assert_eq!(updated.step, 100);
        assert_eq!(ctx.params().step, 100);
    }
}
