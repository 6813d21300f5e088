//! Sender-side scenarios exercising tempo changes, transport control, and
//! seeking end to end.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use phasorsyncrs::error::ClockError;
use phasorsyncrs::message::{MidiRealtimeMessage, PacketList};
use phasorsyncrs::sender::ClockSender;
use phasorsyncrs::time;
use phasorsyncrs::transport::MidiSender;

fn collecting_transport() -> (Box<dyn MidiSender>, Arc<Mutex<Vec<PacketList>>>) {
    struct Collector(Arc<Mutex<Vec<PacketList>>>);
    impl MidiSender for Collector {
        fn send(&mut self, packets: &PacketList) -> Result<(), ClockError> {
            self.0.lock().unwrap().push(packets.clone());
            Ok(())
        }
    }
    let log = Arc::new(Mutex::new(Vec::new()));
    (Box::new(Collector(log.clone())), log)
}

#[test]
fn start_at_zero_cue_emits_start_then_clock() {
    let (transport, log) = collecting_transport();
    let mut sender = ClockSender::new(transport);
    let before = time::now();
    sender.set_tempo(120.0);
    let apply_time = sender.start(0).unwrap();
    assert!(apply_time >= before + time::seconds_to_ticks(0.010));

    thread::sleep(Duration::from_millis(150));
    let sent = log.lock().unwrap();
    let all: Vec<_> = sent.iter().flat_map(|p| p.iter().copied()).collect();
    assert_eq!(all[0].message, MidiRealtimeMessage::Start);
    assert_eq!(all[0].timestamp, apply_time);
    assert!(all.iter().skip(1).all(|m| m.message == MidiRealtimeMessage::Clock));

    let tick_interval = time::seconds_to_ticks(60.0 / (120.0 * 24.0));
    for (i, entry) in all.iter().enumerate().skip(1) {
        let expected = apply_time + (i as u64 - 1) * tick_interval;
        assert!(
            (entry.timestamp as i64 - expected as i64).unsigned_abs() <= 1,
            "tick {i} at {} expected near {expected}",
            entry.timestamp
        );
    }
}

#[test]
fn continue_with_song_position_cues_from_stopped() {
    let (transport, log) = collecting_transport();
    let mut sender = ClockSender::new(transport);
    sender.set_tempo(100.0);
    sender.set_timeline_position(4.0);
    let apply_time = sender.start(0).unwrap();

    let sent = log.lock().unwrap();
    let first_batch: Vec<_> = sent.first().unwrap().iter().map(|m| m.message).collect();
    assert_eq!(
        first_batch,
        vec![
            MidiRealtimeMessage::SongPosition(16),
            MidiRealtimeMessage::Continue,
        ]
    );
    assert!(sent.first().unwrap().iter().all(|m| m.timestamp == apply_time));
}

#[test]
fn tempo_re_rate_mid_flight_widens_future_tick_spacing() {
    let (transport, log) = collecting_transport();
    let mut sender = ClockSender::new(transport);
    sender.set_tempo(120.0);
    sender.start(0).unwrap();
    thread::sleep(Duration::from_millis(80));
    sender.set_tempo(60.0);
    thread::sleep(Duration::from_millis(400));

    let sent = log.lock().unwrap();
    let all: Vec<_> = sent.iter().flat_map(|p| p.iter().copied()).collect();
    let clocks: Vec<_> = all
        .iter()
        .filter(|m| m.message == MidiRealtimeMessage::Clock)
        .map(|m| m.timestamp)
        .collect();
    assert!(clocks.len() > 10, "expected enough ticks to observe a rate change");

    let early_gap = clocks[2] - clocks[1];
    let late_gap = clocks[clocks.len() - 1] - clocks[clocks.len() - 2];
    assert!(
        late_gap > early_gap,
        "expected tick spacing to widen after slowing down: early={early_gap} late={late_gap}"
    );
}

#[test]
fn stop_is_idempotent_and_resets_cued_position() {
    let mut sender = ClockSender::new(Box::new(phasorsyncrs::transport::MockTransport::new()));
    sender.set_tempo(120.0);
    sender.set_timeline_position(8.0);
    sender.start(0).unwrap();
    sender.stop();
    sender.stop();
    assert!(!sender.handle().is_running());
    assert_eq!(sender.timeline_position_for(time::now()), 0.0);
}
