//! 模拟舵机与内存增益总线
//!
//! 用于集成测试与 CLI 的 `simulate` 命令：在内存串口的另一端应答舵机请求。

use crate::error::DriverError;
use crate::hal::GainBus;
use crate::scan_head::JoinTimeout;
use scanhead_protocol::{
    ActuatorCommand, FRAME_OVERHEAD, FrameView, MOVE_STATUS_SUCCESS, REQUEST_MAGIC,
    encode_response,
};
use scanhead_serial::{MockTransport, SerialError, SerialTransport};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU32, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{error, trace};

/// 模拟舵机的可观测状态
#[derive(Debug, Default)]
pub struct SimState {
    angle: AtomicI16,
    /// 运动应答返回失败状态
    reject_moves: AtomicBool,
    /// 不应答任何请求
    mute: AtomicBool,
    /// 运动应答成功但角度不再变化
    stuck: AtomicBool,
    moves: AtomicU32,
    angle_reads: AtomicU32,
    pings: AtomicU32,
}

impl SimState {
    pub fn angle(&self) -> i16 {
        self.angle.load(Ordering::Acquire)
    }

    pub fn set_angle(&self, angle: i16) {
        self.angle.store(angle, Ordering::Release);
    }

    pub fn set_reject_moves(&self, reject: bool) {
        self.reject_moves.store(reject, Ordering::Release);
    }

    pub fn set_mute(&self, mute: bool) {
        self.mute.store(mute, Ordering::Release);
    }

    /// 卡住后运动请求仍应答成功，但角度不再变化
    pub fn set_stuck(&self, stuck: bool) {
        self.stuck.store(stuck, Ordering::Release);
    }

    pub fn moves(&self) -> u32 {
        self.moves.load(Ordering::Acquire)
    }

    pub fn angle_reads(&self) -> u32 {
        self.angle_reads.load(Ordering::Acquire)
    }

    pub fn pings(&self) -> u32 {
        self.pings.load(Ordering::Acquire)
    }
}

/// 模拟舵机
///
/// 运动请求立即到位并应答，读角度返回当前角度，读数据与监控返回固定载荷。
pub struct SimulatedServo {
    state: Arc<SimState>,
    is_running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SimulatedServo {
    /// 在内存串口端点上启动模拟舵机
    pub fn spawn(mut transport: MockTransport, servo_id: u8) -> Self {
        let state = Arc::new(SimState::default());
        let is_running = Arc::new(AtomicBool::new(true));

        let thread_state = state.clone();
        let thread_running = is_running.clone();
        let thread = spawn(move || {
            transport.set_receive_timeout(Duration::from_millis(5));
            while thread_running.load(Ordering::Acquire) {
                match transport.receive() {
                    Ok(bytes) => {
                        for reply in respond(&bytes, servo_id, &thread_state) {
                            if transport.send(&reply).is_err() {
                                return;
                            }
                        }
                    },
                    Err(SerialError::Timeout) => {},
                    Err(_) => break,
                }
            }
        });

        Self {
            state,
            is_running,
            thread: Some(thread),
        }
    }

    pub fn state(&self) -> &Arc<SimState> {
        &self.state
    }
}

impl Drop for SimulatedServo {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take()
            && handle.join_timeout(Duration::from_secs(1)).is_err()
        {
            error!("Simulated servo thread failed to shut down");
        }
    }
}

/// 对一段请求字节生成应答
fn respond(bytes: &[u8], servo_id: u8, state: &SimState) -> Vec<Vec<u8>> {
    let mut replies = Vec::new();
    let mut rest = bytes;
    while rest.len() >= FRAME_OVERHEAD {
        let Ok(view) = FrameView::parse(rest, REQUEST_MAGIC) else {
            break;
        };
        let len = view.frame_len().min(rest.len());
        if let Some(reply) = respond_frame(view, servo_id, state) {
            replies.push(reply);
        }
        rest = &rest[len..];
    }
    replies
}

fn respond_frame(view: FrameView<'_>, servo_id: u8, state: &SimState) -> Option<Vec<u8>> {
    if view.payload_byte(0).ok()? != servo_id {
        return None;
    }
    let command = ActuatorCommand::try_from(view.command_id()).ok()?;
    match command {
        ActuatorCommand::Ping => state.pings.fetch_add(1, Ordering::AcqRel),
        ActuatorCommand::SingleAngleMove => state.moves.fetch_add(1, Ordering::AcqRel),
        ActuatorCommand::ReadAngle => state.angle_reads.fetch_add(1, Ordering::AcqRel),
        _ => 0,
    };
    if state.mute.load(Ordering::Acquire) {
        return None;
    }

    let payload: Vec<u8> = match command {
        ActuatorCommand::Ping => Vec::new(),
        ActuatorCommand::ReadAngle => state.angle().to_le_bytes().to_vec(),
        ActuatorCommand::SingleAngleMove => {
            if state.reject_moves.load(Ordering::Acquire) {
                vec![0x00]
            } else {
                let target = view.payload_i16_le(1).ok()?;
                if !state.stuck.load(Ordering::Acquire) {
                    state.set_angle(target);
                }
                vec![MOVE_STATUS_SUCCESS]
            }
        },
        ActuatorCommand::DataRead => {
            let metric = view.payload_byte(1).ok()?;
            vec![metric, 0x34, 0x12]
        },
        // 监控应答携带 8 个采样点
        ActuatorCommand::DataMonitor => {
            let metric = view.payload_byte(1).ok()?;
            let mut payload = vec![metric];
            for sample in 0..8u16 {
                payload.extend_from_slice(&(0x1234 + sample).to_le_bytes());
            }
            payload
        },
    };
    trace!("Simulated servo answering {:?}", command);
    encode_response(command, servo_id, &payload)
        .ok()
        .map(|frame| frame.to_vec())
}

/// 内存增益总线（每个地址保存最近写入的两个字节，读返回第二个字节）
#[derive(Debug, Default, Clone)]
pub struct MemoryGainBus {
    registers: HashMap<u8, [u8; 2]>,
}

impl MemoryGainBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GainBus for MemoryGainBus {
    fn read_byte(&mut self, address: u8) -> Result<u8, DriverError> {
        Ok(self.registers.get(&address).map_or(0, |pair| pair[1]))
    }

    fn write_pair(&mut self, address: u8, data: [u8; 2]) -> Result<(), DriverError> {
        self.registers.insert(address, data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanhead_protocol::{ActuatorEvent, ActuatorRequest, ChecksumPolicy, decode};

    fn ask(request: ActuatorRequest, state: &SimState) -> Option<ActuatorEvent> {
        let replies = respond(&request.to_frame(), 1, state);
        replies
            .first()
            .map(|reply| decode(reply, ChecksumPolicy::Strict).unwrap())
    }

    #[test]
    fn test_move_then_read_angle() {
        let state = SimState::default();
        let ack = ask(
            ActuatorRequest::Move {
                servo_id: 1,
                angle: 450,
                duration_ms: 100,
            },
            &state,
        );
        assert_eq!(
            ack,
            Some(ActuatorEvent::MoveAck {
                servo_id: 1,
                success: true
            })
        );
        let report = ask(ActuatorRequest::ReadAngle { servo_id: 1 }, &state);
        assert_eq!(
            report,
            Some(ActuatorEvent::AngleReport {
                servo_id: 1,
                angle: 450
            })
        );
        assert_eq!(state.moves(), 1);
        assert_eq!(state.angle_reads(), 1);
    }

    #[test]
    fn test_other_servo_ignored() {
        let state = SimState::default();
        assert!(respond(&ActuatorRequest::Ping { servo_id: 2 }.to_frame(), 1, &state).is_empty());
    }

    #[test]
    fn test_mute_counts_but_does_not_answer() {
        let state = SimState::default();
        state.set_mute(true);
        assert!(ask(ActuatorRequest::Ping { servo_id: 1 }, &state).is_none());
        assert_eq!(state.pings(), 1);
    }

    #[test]
    fn test_two_frames_in_one_chunk() {
        let state = SimState::default();
        let mut bytes = ActuatorRequest::Ping { servo_id: 1 }.to_frame().to_vec();
        bytes.extend_from_slice(&ActuatorRequest::ReadAngle { servo_id: 1 }.to_frame());
        assert_eq!(respond(&bytes, 1, &state).len(), 2);
    }

    #[test]
    fn test_memory_gain_bus() {
        let mut bus = MemoryGainBus::new();
        assert_eq!(bus.read_byte(0x20).unwrap(), 0);
        bus.write_pair(0x20, [0x01, 0x80]).unwrap();
        assert_eq!(bus.read_byte(0x20).unwrap(), 0x80);
    }
}
