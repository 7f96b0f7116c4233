//! 帧头魔数与命令 ID 定义

/// 舵机请求帧头
pub const REQUEST_MAGIC: [u8; 2] = [0x12, 0x4C];

/// 舵机应答帧头
pub const RESPONSE_MAGIC: [u8; 2] = [0x05, 0x1C];

/// 舵机请求帧最大长度（帧头 + 命令 + 长度 + 载荷 + 校验和）
pub const MAX_FRAME_LEN: usize = 20;

/// 舵机应答帧最大长度（接收缓冲区大小），数据读取/监控应答可能超过请求帧上限
pub const MAX_RESPONSE_LEN: usize = 50;

/// 舵机帧固定开销：帧头 2 + 命令 1 + 长度 1 + 校验和 1
pub const FRAME_OVERHEAD: usize = 5;

/// 上位机命令帧头
pub const HOST_MAGIC: [u8; 2] = [0xA0, 0xB3];

/// 遥测记录起始同步字
pub const TELEMETRY_SYNC_HEAD: [u8; 2] = [0xA9, 0xB5];

/// 遥测记录结束同步字
pub const TELEMETRY_SYNC_TAIL: u8 = 0x33;

/// 舵机协议命令 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum ActuatorCommand {
    /// 通讯检测
    Ping = 0x01,
    /// 读取数据项
    DataRead = 0x03,
    /// 单圈角度控制
    SingleAngleMove = 0x08,
    /// 读取当前角度
    ReadAngle = 0x0A,
    /// 数据监控
    DataMonitor = 0x16,
}

impl ActuatorCommand {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 上位机命令 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum HostCommandId {
    ReadParams = 0x01,
    WriteParams = 0x02,
    SetUploadRate = 0x03,
    SetAdjustRate = 0x04,
    SetDwell = 0x05,
    SetPositions = 0x06,
    SetModeMask = 0x07,
    SetWarmup = 0x08,
    GainRead = 0x11,
    GainWrite = 0x12,
    ServoPing = 0x13,
    ServoMove = 0x14,
    ServoReadAngle = 0x15,
    ServoDataRead = 0x16,
    ServoMonitor = 0x17,
    StartDebug = 0x21,
    StartContinuous = 0x22,
    StartDiscrete = 0x23,
}

impl HostCommandId {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actuator_command_from_u8() {
        assert_eq!(
            ActuatorCommand::try_from(0x0A).unwrap(),
            ActuatorCommand::ReadAngle
        );
        assert_eq!(ActuatorCommand::SingleAngleMove.as_u8(), 0x08);
        assert!(ActuatorCommand::try_from(0x02).is_err());
    }

    #[test]
    fn test_host_command_id_from_u8() {
        assert_eq!(
            HostCommandId::try_from(0x22).unwrap(),
            HostCommandId::StartContinuous
        );
        assert!(HostCommandId::try_from(0x09).is_err());
        assert!(HostCommandId::try_from(0x24).is_err());
    }

    #[test]
    fn test_magics_distinct() {
        assert_ne!(REQUEST_MAGIC, RESPONSE_MAGIC);
    }
}
