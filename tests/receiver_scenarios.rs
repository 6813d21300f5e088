//! Receiver-side invariants exercised across a full packet list, rather
//! than as hand-fed individual messages.

use phasorsyncrs::message::{MidiRealtimeMessage, PacketList};
use phasorsyncrs::receiver::ClockReceiver;
use phasorsyncrs::time::HostTicks;

const TICK_INTERVAL: HostTicks = 20_833; // 120 BPM at 24 ppq

fn steady_run(ticks: usize) -> PacketList {
    let mut list = PacketList::new();
    for i in 0..ticks {
        list.push(i as u64 * TICK_INTERVAL, MidiRealtimeMessage::Clock);
    }
    list.push(ticks as u64 * TICK_INTERVAL, MidiRealtimeMessage::Start);
    list
}

#[test]
fn timeline_position_is_monotonically_non_decreasing_while_running() {
    let mut receiver = ClockReceiver::new(None);
    receiver.receive_packet_list(&steady_run(40));

    let mut ticking = PacketList::new();
    for i in 41..80 {
        ticking.push(i as u64 * TICK_INTERVAL, MidiRealtimeMessage::Clock);
    }
    receiver.receive_packet_list(&ticking);

    let mut last = receiver.timeline_position_for(41 * TICK_INTERVAL);
    for i in 42..80 {
        let pos = receiver.timeline_position_for(i * TICK_INTERVAL);
        assert!(pos >= last, "position went backwards at tick {i}: {pos} < {last}");
        last = pos;
    }
}

#[test]
fn packet_list_round_trips_through_build_and_parse_before_dispatch() {
    let mut built = PacketList::new();
    for i in 0..10u64 {
        built.push(i * TICK_INTERVAL, MidiRealtimeMessage::Clock);
    }
    built.push(10 * TICK_INTERVAL, MidiRealtimeMessage::Start);
    built.push(11 * TICK_INTERVAL, MidiRealtimeMessage::Clock);

    let wire = built.build();
    let parsed = PacketList::parse(&wire);
    assert_eq!(parsed, built);

    let mut receiver = ClockReceiver::new(None);
    receiver.receive_packet_list(&parsed);
    assert!(receiver.is_clock_running());
}

#[test]
fn reset_on_a_fresh_receiver_is_a_no_op() {
    let mut receiver = ClockReceiver::new(None);
    receiver.reset();
    assert!(!receiver.is_receiving_tempo());
    assert!(!receiver.is_clock_running());
    assert_eq!(receiver.tempo(), 0.0);
}
