//! 运行参数
//!
//! 上电时使用默认值创建，之后只由命令分发器修改。读参数命令的应答与批量写参数命令
//! 的载荷使用同一个 18 字节大端参数块。

use crate::mode::{ModeMask, ScanMode};
use crate::schema::{self, Endian, FieldKind, FieldSpec, Record};
use crate::ProtocolError;
use std::time::Duration;

/// 参数块长度
pub const PARAMS_BLOCK_LEN: usize = schema::schema_len(ControlParams::SCHEMA);

/// 运行参数
///
/// 位置单位为 0.1°，时间单位为毫秒，频率单位为 Hz。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ControlParams {
    /// 模式掩码原始值（见 [`ModeMask`]）
    pub mode_mask: u16,
    /// 扫描下限
    pub low: i16,
    /// 扫描上限
    pub high: i16,
    /// 步进扫描步长
    pub step: i16,
    /// Debug 模式目标位置
    pub target: i16,
    /// 增益调节频率
    pub adjust_rate_hz: u16,
    /// 周期上传频率
    pub upload_rate_hz: u16,
    /// 舵机运动（驻留）时间
    pub dwell_ms: u16,
    /// 发射管预热时间
    pub warmup_ms: u16,
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            mode_mask: 0,
            low: 0,
            high: 1000,
            step: 10,
            target: 500,
            adjust_rate_hz: 10,
            upload_rate_hz: 1,
            dwell_ms: 1000,
            warmup_ms: 10,
        }
    }
}

/// 参数块字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamsField {
    ModeMask,
    Low,
    High,
    Step,
    Target,
    AdjustRate,
    UploadRate,
    Dwell,
    Warmup,
}

impl Record for ControlParams {
    type Field = ParamsField;

    const SCHEMA: &'static [FieldSpec<ParamsField>] = &[
        FieldSpec::new(ParamsField::ModeMask, FieldKind::U16(Endian::Big), 1),
        FieldSpec::new(ParamsField::Low, FieldKind::I16(Endian::Big), 1),
        FieldSpec::new(ParamsField::High, FieldKind::I16(Endian::Big), 1),
        FieldSpec::new(ParamsField::Step, FieldKind::I16(Endian::Big), 1),
        FieldSpec::new(ParamsField::Target, FieldKind::I16(Endian::Big), 1),
        FieldSpec::new(ParamsField::AdjustRate, FieldKind::U16(Endian::Big), 1),
        FieldSpec::new(ParamsField::UploadRate, FieldKind::U16(Endian::Big), 1),
        FieldSpec::new(ParamsField::Dwell, FieldKind::U16(Endian::Big), 1),
        FieldSpec::new(ParamsField::Warmup, FieldKind::U16(Endian::Big), 1),
    ];

    fn get(&self, field: ParamsField, _index: usize) -> i32 {
        match field {
            ParamsField::ModeMask => self.mode_mask as i32,
            ParamsField::Low => self.low as i32,
            ParamsField::High => self.high as i32,
            ParamsField::Step => self.step as i32,
            ParamsField::Target => self.target as i32,
            ParamsField::AdjustRate => self.adjust_rate_hz as i32,
            ParamsField::UploadRate => self.upload_rate_hz as i32,
            ParamsField::Dwell => self.dwell_ms as i32,
            ParamsField::Warmup => self.warmup_ms as i32,
        }
    }

    fn set(&mut self, field: ParamsField, _index: usize, value: i32) {
        match field {
            ParamsField::ModeMask => self.mode_mask = value as u16,
            ParamsField::Low => self.low = value as i16,
            ParamsField::High => self.high = value as i16,
            ParamsField::Step => self.step = value as i16,
            ParamsField::Target => self.target = value as i16,
            ParamsField::AdjustRate => self.adjust_rate_hz = value as u16,
            ParamsField::UploadRate => self.upload_rate_hz = value as u16,
            ParamsField::Dwell => self.dwell_ms = value as u16,
            ParamsField::Warmup => self.warmup_ms = value as u16,
        }
    }
}

impl ControlParams {
    pub fn mode_mask(&self) -> ModeMask {
        ModeMask::from_raw(self.mode_mask)
    }

    /// 当前选择的扫描模式
    ///
    /// # 错误
    ///
    /// 多个模式位同时置位时返回 `ProtocolError::ConflictingModes`。
    pub fn scan_mode(&self) -> Result<Option<ScanMode>, ProtocolError> {
        self.mode_mask().scan_mode()
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms as u64)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms as u64)
    }

    /// 周期上传间隔（频率为 0 时关闭）
    pub fn upload_period(&self) -> Option<Duration> {
        rate_to_period(self.upload_rate_hz)
    }

    /// 增益调节间隔（频率为 0 时关闭）
    pub fn adjust_period(&self) -> Option<Duration> {
        rate_to_period(self.adjust_rate_hz)
    }

    /// 编码为 18 字节大端参数块
    pub fn to_block(&self) -> [u8; PARAMS_BLOCK_LEN] {
        let mut buf = [0u8; PARAMS_BLOCK_LEN];
        // 缓冲区长度与字段表一致，编码不会失败
        let _ = schema::encode_into(self, &mut buf);
        buf
    }

    /// 从参数块解码
    pub fn from_block(bytes: &[u8]) -> Result<Self, ProtocolError> {
        schema::decode_from(bytes)
    }
}

fn rate_to_period(rate_hz: u16) -> Option<Duration> {
    if rate_hz == 0 {
        None
    } else {
        Some(Duration::from_micros(1_000_000 / rate_hz as u64))
    }
}
