//! 模式掩码与发射管掩码
//!
//! 模式掩码（16 位）：
//! - Bit 0: Debug（定点调试）
//! - Bit 1: Continuous（连续往返扫描）
//! - Bit 2: Discrete（步进扫描）
//! - Bit 4-6: Debug 模式下直接驱动的发射管 1-3
//!
//! 三个模式位互斥，同时置位多个模式位视为配置错误。

use crate::ProtocolError;
use bilge::prelude::*;

/// 模式掩码位域
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeMask {
    pub debug: bool,      // Bit 0
    pub continuous: bool, // Bit 1
    pub discrete: bool,   // Bit 2
    pub reserved0: u1,    // Bit 3
    pub emitter1: bool,   // Bit 4
    pub emitter2: bool,   // Bit 5
    pub emitter3: bool,   // Bit 6
    pub reserved1: u9,    // Bit 7-15
}

/// 扫描模式（互斥）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanMode {
    /// 定点：舵机保持在目标位置，发射管按掩码静态点亮，周期上传
    Debug,
    /// 连续：在上下限之间往返，半周期内周期上传
    Continuous,
    /// 步进：逐点移动，到位确认后每个发射管组合上传一帧
    Discrete,
}

impl ModeMask {
    pub const DEBUG_BIT: u16 = 0x0001;
    pub const CONTINUOUS_BIT: u16 = 0x0002;
    pub const DISCRETE_BIT: u16 = 0x0004;
    pub const EMITTER_BITS: u16 = 0x0070;

    pub fn from_raw(raw: u16) -> Self {
        Self::from(raw)
    }

    pub fn raw(self) -> u16 {
        u16::from(self)
    }

    /// 由模式和发射管掩码组合
    pub fn compose(mode: Option<ScanMode>, emitters: EmitterMask) -> Self {
        let mode_bit = match mode {
            None => 0,
            Some(ScanMode::Debug) => Self::DEBUG_BIT,
            Some(ScanMode::Continuous) => Self::CONTINUOUS_BIT,
            Some(ScanMode::Discrete) => Self::DISCRETE_BIT,
        };
        Self::from_raw(mode_bit | ((emitters.bits() as u16) << 4))
    }

    /// 解析互斥模式
    ///
    /// # 返回
    ///
    /// - `Ok(None)`: 未选择任何模式（空闲）
    /// - `Ok(Some(mode))`: 恰好一个模式位
    ///
    /// # 错误
    ///
    /// 多个模式位同时置位时返回 `ProtocolError::ConflictingModes`。
    pub fn scan_mode(self) -> Result<Option<ScanMode>, ProtocolError> {
        match (self.debug(), self.continuous(), self.discrete()) {
            (false, false, false) => Ok(None),
            (true, false, false) => Ok(Some(ScanMode::Debug)),
            (false, true, false) => Ok(Some(ScanMode::Continuous)),
            (false, false, true) => Ok(Some(ScanMode::Discrete)),
            _ => Err(ProtocolError::ConflictingModes { mask: self.raw() }),
        }
    }

    /// Debug 模式下静态点亮的发射管
    pub fn emitters(self) -> EmitterMask {
        EmitterMask::from_bits(((self.raw() & Self::EMITTER_BITS) >> 4) as u8)
    }
}

/// 发射管掩码（Bit 0-2 对应发射管 1-3）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmitterMask(u8);

/// 扫描子步的发射管组合表：全灭（暗帧）、发射管 1、发射管 2、1+2
pub const EMITTER_TABLE: [EmitterMask; 4] = [
    EmitterMask(0x00),
    EmitterMask(0x01),
    EmitterMask(0x02),
    EmitterMask(0x03),
];

/// 发射管数量
pub const EMITTER_LINES: usize = 3;

impl EmitterMask {
    pub const OFF: EmitterMask = EmitterMask(0);

    /// 只保留低 3 位
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x07)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// 子步索引对应的组合（索引按 4 取模）
    pub fn for_index(index: u8) -> Self {
        EMITTER_TABLE[(index as usize) % EMITTER_TABLE.len()]
    }

    /// 第 `line` 路（0 起）是否点亮
    pub fn is_on(self, line: usize) -> bool {
        line < EMITTER_LINES && self.0 & (1 << line) != 0
    }
}
