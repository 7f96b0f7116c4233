//! # 扫描头配置
//!
//! TOML 配置文件，所有字段都有默认值：
//!
//! ```toml
//! [link]
//! actuator_port = "/dev/ttyUSB0"
//! host_port = "/dev/ttyUSB1"
//! baud_rate = 115200
//! checksum = "lenient"
//!
//! [servo]
//! id = 1
//!
//! [params]
//! mode_mask = 4
//! low = 0
//! high = 1000
//! step = 100
//!
//! [timing]
//! discrete_max_attempts = 3
//! ```

use crate::controller::ControllerConfig;
use crate::error::ControlError;
use scanhead_driver::{LinkConfig, PipelineConfig};
use scanhead_protocol::{ChecksumPolicy, ControlParams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 扫描头配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanHeadConfig {
    /// 串口链路
    pub link: LinkSection,
    /// 舵机
    pub servo: ServoSection,
    /// 初始运行参数
    pub params: ControlParams,
    /// 轮询与重试
    pub timing: TimingSection,
    /// 增益总线
    pub gain: GainSection,
}

/// 串口链路设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSection {
    /// 舵机串口（`None` 时只能使用模拟舵机）
    pub actuator_port: Option<String>,
    /// 上位机串口
    pub host_port: Option<String>,
    pub baud_rate: u32,
    /// 应答帧校验和策略
    pub checksum: ChecksumPolicy,
    /// 接收空闲间隔（毫秒），超过此间隔视为一个缓冲结束
    pub receive_idle_ms: u64,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            actuator_port: None,
            host_port: None,
            baud_rate: 115_200,
            checksum: ChecksumPolicy::Lenient,
            receive_idle_ms: 2,
        }
    }
}

/// 舵机设置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoSection {
    pub id: u8,
}

/// 轮询与重试设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    /// 轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 单次读角度等待应答的时间（毫秒）
    pub angle_reply_timeout_ms: u64,
    /// Discrete 模式每个位置的最多尝试次数
    pub discrete_max_attempts: u32,
    /// Continuous 模式等待到达边界的上限（毫秒），缺省为不限时
    pub continuous_confirm_timeout_ms: Option<u64>,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            angle_reply_timeout_ms: 50,
            discrete_max_attempts: 3,
            continuous_confirm_timeout_ms: None,
        }
    }
}

/// 增益总线设置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainSection {
    /// 4 个增益级的总线地址（调试命令按下标访问）
    pub bus_addresses: [u8; 4],
}

impl ScanHeadConfig {
    /// 从文件加载配置
    ///
    /// # 错误
    ///
    /// - `ControlError::Io`: 文件无法读取
    /// - `ControlError::Config`: TOML 格式错误或字段取值无效
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ControlError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ControlError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ControlError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 序列化为 TOML 文本
    pub fn to_toml_string(&self) -> Result<String, ControlError> {
        toml::to_string_pretty(self).map_err(|e| ControlError::Config(e.to_string()))
    }

    /// 保存配置到文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ControlError> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// 校验字段取值
    ///
    /// # 错误
    ///
    /// - `ControlError::ConflictingModes`: 初始掩码同时选中多个模式
    /// - `ControlError::Config`: 边界颠倒、步长为 0 或次数为 0
    pub fn validate(&self) -> Result<(), ControlError> {
        self.params.scan_mode().map_err(ControlError::from_mode)?;
        if self.params.low > self.params.high {
            return Err(ControlError::Config(format!(
                "params.low ({}) is above params.high ({})",
                self.params.low, self.params.high
            )));
        }
        if self.params.step == 0 {
            return Err(ControlError::Config("params.step must not be 0".into()));
        }
        if self.timing.discrete_max_attempts == 0 {
            return Err(ControlError::Config(
                "timing.discrete_max_attempts must be at least 1".into(),
            ));
        }
        if self.timing.poll_interval_ms == 0 {
            return Err(ControlError::Config(
                "timing.poll_interval_ms must not be 0".into(),
            ));
        }
        Ok(())
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            poll_interval: Duration::from_millis(self.timing.poll_interval_ms),
            reply_timeout: Duration::from_millis(self.timing.angle_reply_timeout_ms),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            receive_timeout_ms: self.link.receive_idle_ms,
            checksum: self.link.checksum,
            ..PipelineConfig::default()
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            discrete_max_attempts: self.timing.discrete_max_attempts,
            continuous_confirm_timeout: self
                .timing
                .continuous_confirm_timeout_ms
                .map(Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ScanHeadConfig::from_toml_str("").unwrap();
        assert_eq!(config, ScanHeadConfig::default());
        assert_eq!(config.link.baud_rate, 115_200);
        assert_eq!(config.params.high, 1000);
        assert_eq!(config.controller_config(), ControllerConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = ScanHeadConfig::from_toml_str(
            r#"
            [link]
            checksum = "strict"

            [params]
            mode_mask = 4
            step = 100

            [timing]
            continuous_confirm_timeout_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.link.checksum, ChecksumPolicy::Strict);
        assert_eq!(config.pipeline_config().checksum, ChecksumPolicy::Strict);
        assert_eq!(config.params.step, 100);
        assert_eq!(config.params.dwell_ms, 1000);
        assert_eq!(
            config.controller_config().continuous_confirm_timeout,
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_conflicting_modes_rejected() {
        let result = ScanHeadConfig::from_toml_str("[params]\nmode_mask = 3\n");
        assert!(matches!(
            result,
            Err(ControlError::ConflictingModes { mask: 3 })
        ));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let result = ScanHeadConfig::from_toml_str("[params]\nlow = 500\nhigh = 100\n");
        assert!(matches!(result, Err(ControlError::Config(_))));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = ScanHeadConfig::default();
        config.link.actuator_port = Some("/dev/ttyUSB0".into());
        config.servo.id = 3;
        config.gain.bus_addresses = [0x50, 0x51, 0x52, 0x53];
        let text = config.to_toml_string().unwrap();
        assert_eq!(ScanHeadConfig::from_toml_str(&text).unwrap(), config);
    }
}
