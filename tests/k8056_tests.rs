//! Wire level tests of the K8056 driver against an in-memory serial line

use k8056_spectrograph::k8056::K8056Error;
use k8056_spectrograph::k8056::RelayDriver;
use k8056_spectrograph::k8056::K8056;
use k8056_spectrograph::k8056_types::DriverConfig;

use std::io;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

#[derive(Clone, Default)]
struct Line(Arc<Mutex<Vec<Vec<u8>>>>);

impl Line {
    fn writes(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for Line {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct BrokenLine;

impl Write for BrokenLine {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn card(repeat: u32) -> (K8056<Line>, Line) {
    let line = Line::default();
    let card = K8056::with_transport(line.clone(), DriverConfig::new(repeat, Duration::ZERO));
    (card, line)
}

fn checksum(frame: &[u8]) -> u8 {
    (243i32 - frame[2] as i32 - frame[3] as i32 - frame[1] as i32).rem_euclid(256) as u8
}

#[test]
fn test_set_relay_frames() {
    for relay in 1..=9u8 {
        for address in [0u8, 1, 2, 127, 255] {
            let (mut card, line) = card(0);
            card.set_relay(relay, address).unwrap();
            let writes = line.writes();
            assert_eq!(writes.len(), 1);
            let frame = &writes[0];
            assert_eq!(frame.len(), 5);
            assert_eq!(&frame[..4], &[13, address, 83, relay + 48]);
            assert_eq!(frame[4], checksum(frame));
        }
    }
}

#[test]
fn test_clear_and_toggle_instructions() {
    let (mut card, line) = card(0);
    card.clear_relay(3, 1).unwrap();
    card.toggle_relay(9, 1).unwrap();
    assert_eq!(
        line.writes(),
        vec![vec![13, 1, 67, 51, 124], vec![13, 1, 84, 57, 101]]
    );
}

#[test]
fn test_invalid_relay_writes_nothing() {
    let (mut card, line) = card(3);
    for relay in [0u8, 10, 11, 48, 255] {
        assert!(matches!(
            card.set_relay(relay, 1),
            Err(K8056Error::InvalidRelayIndex(r)) if r == relay
        ));
        assert!(matches!(
            card.clear_relay(relay, 1),
            Err(K8056Error::InvalidRelayIndex(_))
        ));
        assert!(matches!(
            card.toggle_relay(relay, 1),
            Err(K8056Error::InvalidRelayIndex(_))
        ));
    }
    assert!(line.writes().is_empty());
}

#[test]
fn test_repeat_sends_identical_frames() {
    for repeat in 0..5u32 {
        let (mut card, line) = card(repeat);
        card.send_byte(0b1010_0101, 7).unwrap();
        let writes = line.writes();
        assert_eq!(writes.len(), repeat as usize + 1);
        assert!(writes.iter().all(|w| w == &writes[0]));
        assert_eq!(&writes[0][..4], &[13, 7, 66, 0b1010_0101]);
    }
}

#[test]
fn test_set_address_frame() {
    let (mut card, line) = card(0);
    card.set_address(5, 1).unwrap();
    let writes = line.writes();
    assert_eq!(&writes[0][..4], &[13, 1, 65, 5]);
    assert_eq!(writes[0][4], checksum(&writes[0]));
}

#[test]
fn test_broadcast_commands_use_fixed_address_and_data() {
    let (mut card, line) = card(0);
    card.emergency_stop().unwrap();
    card.force_address().unwrap();
    card.query_address().unwrap();
    let writes = line.writes();
    let heads: Vec<&[u8]> = writes.iter().map(|w| &w[..4]).collect();
    assert_eq!(
        heads,
        vec![&[13u8, 1, 69, 1][..], &[13, 1, 70, 1][..], &[13, 1, 68, 1][..]]
    );
    for write in &writes {
        assert_eq!(write[4], checksum(write));
    }
}

#[test]
fn test_wait_follows_every_transmission() {
    let line = Line::default();
    let mut card = K8056::with_transport(
        line.clone(),
        DriverConfig::new(2, Duration::from_millis(20)),
    );
    let start = Instant::now();
    card.set_relay(1, 1).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(60));
    assert_eq!(line.writes().len(), 3);
}

#[test]
fn test_write_failure_is_transport_unavailable() {
    let mut card = K8056::with_transport(BrokenLine, DriverConfig::default());
    assert!(matches!(
        card.set_relay(1, 1),
        Err(K8056Error::TransportUnavailable(_))
    ));
}

#[test]
fn test_open_missing_device_fails() {
    let result = K8056::open("/dev/does-not-exist-k8056", DriverConfig::default());
    assert!(matches!(result, Err(K8056Error::TransportUnavailable(_))));
}

#[test]
fn test_close_releases_transport() {
    let (card, line) = card(0);
    assert_eq!(Arc::strong_count(&line.0), 2);
    card.close();
    assert_eq!(Arc::strong_count(&line.0), 1);
}
