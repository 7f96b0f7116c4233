//! 上位机命令经串口到达分发器的端到端测试

use scanhead_control::{CommandDispatcher, ControlError, ScanHeadConfig};
use scanhead_driver::{MemoryGainBus, ScanHead, ScanHeadBuilder, SimulatedServo};
use scanhead_protocol::{
    ControlParams, FrameView, HostCommand, PARAMS_BLOCK_LEN, RESPONSE_MAGIC,
};
use scanhead_serial::{MockTransport, SerialTransport};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;

struct Station {
    head: Arc<ScanHead>,
    host: MockTransport,
    stop: Arc<AtomicBool>,
    dispatcher: Option<JoinHandle<()>>,
    _servo: SimulatedServo,
}

impl Station {
    fn new(config: &ScanHeadConfig) -> Self {
        let (actuator, servo_end) = MockTransport::pair();
        let (host_link, mut host) = MockTransport::pair();
        host.set_receive_timeout(Duration::from_millis(500));
        let servo = SimulatedServo::spawn(servo_end, config.servo.id);

        let head = Arc::new(
            ScanHeadBuilder::new()
                .servo_id(config.servo.id)
                .params(config.params)
                .link_config(config.link_config())
                .pipeline_config(config.pipeline_config())
                .gain_bus(MemoryGainBus::new())
                .gain_addresses(config.gain.bus_addresses)
                .build(actuator, host_link)
                .unwrap(),
        );

        let stop = Arc::new(AtomicBool::new(false));
        let dispatcher = CommandDispatcher::new(head.clone());
        let thread_stop = stop.clone();
        let thread = spawn(move || dispatcher.run(&thread_stop));

        Self {
            head,
            host,
            stop,
            dispatcher: Some(thread),
            _servo: servo,
        }
    }

    fn send(&mut self, command: HostCommand) {
        self.host.send(&command.encode()).unwrap();
    }
}

impl Drop for Station {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.dispatcher.take() {
            let _ = thread.join();
        }
    }
}

fn quiet_config() -> ScanHeadConfig {
    let mut config = ScanHeadConfig::default();
    config.servo.id = 2;
    config.params.upload_rate_hz = 0;
    config.params.adjust_rate_hz = 0;
    config.gain.bus_addresses = [0x40, 0x41, 0x42, 0x43];
    config
}

#[test]
fn test_read_params_replies_with_block() {
    let mut station = Station::new(&quiet_config());
    station.send(HostCommand::SetDwell(250));
    station.send(HostCommand::ReadParams);

    let reply = station.host.receive().unwrap();
    assert_eq!(reply.len(), PARAMS_BLOCK_LEN);
    let params = ControlParams::from_block(&reply).unwrap();
    assert_eq!(params.dwell_ms, 250);
    assert_eq!(params, station.head.params());
}

#[test]
fn test_gain_write_then_read() {
    let mut station = Station::new(&quiet_config());
    station.send(HostCommand::GainWrite {
        bus: 1,
        data: [0x00, 0x7A],
    });
    station.send(HostCommand::GainRead { bus: 1 });

    let reply = station.host.receive().unwrap();
    assert_eq!(reply, vec![0x7A]);
}

#[test]
fn test_servo_ping_relayed_from_host_command() {
    let mut station = Station::new(&quiet_config());
    station.send(HostCommand::ServoPing { servo_id: 2 });

    let reply = station.host.receive().unwrap();
    let view = FrameView::parse(&reply, RESPONSE_MAGIC).unwrap();
    assert_eq!(view.payload_byte(0).unwrap(), 2);
}

#[test]
fn test_unknown_and_conflicting_commands_send_nothing() {
    let mut station = Station::new(&quiet_config());
    station.host.send(&[0xA0, 0xB3, 0x7E, 0x00, 0x01]).unwrap();
    station.send(HostCommand::SetModeMask(0x0006));

    station.host.set_receive_timeout(Duration::from_millis(100));
    assert!(station.host.receive().is_err());
    assert_eq!(station.head.params().mode_mask, 0);
}

#[test]
fn test_dispatcher_rejects_conflict_directly() {
    let station = Station::new(&quiet_config());
    let dispatcher = CommandDispatcher::new(station.head.clone());
    let mut buffer = HostCommand::SetModeMask(0x0003).encode();
    assert!(matches!(
        dispatcher.dispatch(&mut buffer),
        Err(ControlError::ConflictingModes { mask: 0x0003 })
    ));
    assert!(buffer.is_empty());
}

#[test]
fn test_config_file_drives_station() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[servo]
id = 2

[params]
upload_rate_hz = 0
adjust_rate_hz = 0
low = 100
high = 900

[gain]
bus_addresses = [16, 17, 18, 19]
"#
    )
    .unwrap();

    let config = ScanHeadConfig::load(file.path()).unwrap();
    assert_eq!(config.gain.bus_addresses, [16, 17, 18, 19]);

    let mut station = Station::new(&config);
    station.send(HostCommand::ReadParams);
    let params = ControlParams::from_block(&station.host.receive().unwrap()).unwrap();
    assert_eq!((params.low, params.high), (100, 900));
}
