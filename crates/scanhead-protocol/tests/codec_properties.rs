//! 编解码属性测试
//!
//! 使用 proptest 验证帧编码、遥测记录与参数块的性质。

use proptest::prelude::*;
use scanhead_protocol::*;

fn any_command() -> impl Strategy<Value = ActuatorCommand> {
    prop_oneof![
        Just(ActuatorCommand::Ping),
        Just(ActuatorCommand::DataRead),
        Just(ActuatorCommand::SingleAngleMove),
        Just(ActuatorCommand::ReadAngle),
        Just(ActuatorCommand::DataMonitor),
    ]
}

proptest! {
    /// 请求帧头、命令、长度字段与输入一致，校验和为之前字节之和
    #[test]
    fn encoded_frame_fields_match(
        cmd in any_command(),
        servo_id in any::<u8>(),
        payload in proptest::collection::vec(any::<u8>(), 0..=14),
    ) {
        let frame = encode(cmd, servo_id, &payload).unwrap();
        let view = FrameView::parse(&frame, REQUEST_MAGIC).unwrap();

        prop_assert_eq!(view.command_id(), cmd.as_u8());
        prop_assert_eq!(view.declared_len() as usize, 1 + payload.len());
        prop_assert_eq!(view.frame_len(), frame.len());
        prop_assert_eq!(view.payload()[0], servo_id);
        prop_assert_eq!(&view.payload()[1..], payload.as_slice());

        let last = frame.len() - 1;
        prop_assert_eq!(frame[last], checksum(&frame[..last]));
        prop_assert!(view.verify_checksum().is_ok());
    }

    /// 读角度应答携带的任意角度都能被还原
    #[test]
    fn angle_report_recovers_angle(angle in any::<i16>(), servo_id in any::<u8>()) {
        let frame = encode_response(ActuatorCommand::ReadAngle, servo_id, &angle.to_le_bytes()).unwrap();
        prop_assert_eq!(
            decode(&frame, ChecksumPolicy::Strict).unwrap(),
            ActuatorEvent::AngleReport { servo_id, angle }
        );
    }

    /// 遥测记录字段经 40 字节编码后保持不变
    #[test]
    fn telemetry_fields_survive_encoding(
        generic in any::<[u16; 4]>(),
        precision in any::<[i16; 8]>(),
        gain in any::<[u8; 8]>(),
        master_frame in any::<u16>(),
        sub_frame in any::<u16>(),
        emitter in 0u8..4,
    ) {
        let frame = TelemetryFrame {
            generic,
            precision,
            gain,
            master_frame,
            sub_frame,
            emitter_mask: EmitterMask::for_index(emitter).bits(),
        };
        let bytes = frame.to_bytes();
        prop_assert_eq!(bytes[0], 0xA9);
        prop_assert_eq!(bytes[39], 0x33);
        prop_assert_eq!(TelemetryFrame::try_from(&bytes[..]).unwrap(), frame);
    }

    /// 重组器对任意分段方式给出相同的帧序列
    #[test]
    fn assembler_is_split_invariant(
        angles in proptest::collection::vec(any::<i16>(), 1..6),
        cut in 1usize..12,
    ) {
        let mut stream = Vec::new();
        for angle in &angles {
            stream.extend_from_slice(
                &encode_response(ActuatorCommand::ReadAngle, 0, &angle.to_le_bytes()).unwrap(),
            );
        }

        let mut asm = ResponseAssembler::new();
        let mut decoded = Vec::new();
        for chunk in stream.chunks(cut) {
            asm.push(chunk);
            while let Some(frame) = asm.next_frame() {
                if let Ok(ActuatorEvent::AngleReport { angle, .. }) = decode(&frame, ChecksumPolicy::Strict) {
                    decoded.push(angle);
                }
            }
        }
        prop_assert_eq!(decoded, angles);
    }

    /// 任何模式掩码要么给出唯一模式，要么报告冲突
    #[test]
    fn mode_mask_is_exclusive(raw in any::<u16>()) {
        let mode_bits = (raw & 0x0007).count_ones();
        match ModeMask::from_raw(raw).scan_mode() {
            Ok(None) => prop_assert_eq!(mode_bits, 0),
            Ok(Some(_)) => prop_assert_eq!(mode_bits, 1),
            Err(ProtocolError::ConflictingModes { mask }) => {
                prop_assert!(mode_bits > 1);
                prop_assert_eq!(mask, raw);
            },
            Err(e) => prop_assert!(false, "unexpected error {:?}", e),
        }
    }
}
