//! Clock Receiver: converts a jittery stream of incoming `Clock` timestamps
//! into a stable tempo estimate and timeline-position mapping.
//!
//! [`ClockReceiver`] itself is owned and mutated only by the MIDI input
//! thread (`receive_packet_list` must not block or allocate on the hot
//! path beyond what `TempoFilter` already does). Realtime/audio-thread
//! readers use the cheap, cloneable [`ClockReceiverHandle`] instead.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::ClockError;
use crate::message::{MidiRealtimeMessage, PacketList};
use crate::realtime::{AtomicF64, SeqLockPair};
use crate::tempo_filter::{TempoFilter, DEFAULT_WINDOW};
use crate::time::{self, HostTicks};
use crate::transport::{ClockEvent, NotificationSink};

const MIN_WATCHDOG_TIMEOUT_SECS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReceiverState {
    Idle = 0,
    ReceivingTempo = 1,
    Running = 2,
}

impl ReceiverState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ReceiverState::ReceivingTempo,
            2 => ReceiverState::Running,
            _ => ReceiverState::Idle,
        }
    }
}

struct ReceiverRealtime {
    state: AtomicU8,
    tempo: AtomicF64,
    error: AtomicF64,
    /// (anchor host ticks, anchor beat)
    anchor: SeqLockPair,
}

impl ReceiverRealtime {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ReceiverState::Idle as u8),
            tempo: AtomicF64::new(0.0),
            error: AtomicF64::new(0.0),
            anchor: SeqLockPair::new(0, 0.0),
        }
    }
}

/// Cheap, cloneable, lock-free-readable handle for the realtime/audio
/// thread. Holds no filter state and never touches the MIDI input path.
#[derive(Clone)]
pub struct ClockReceiverHandle {
    inner: Arc<ReceiverRealtime>,
}

impl ClockReceiverHandle {
    fn state(&self) -> ReceiverState {
        ReceiverState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_receiving_tempo(&self) -> bool {
        self.state() != ReceiverState::Idle
    }

    pub fn is_clock_running(&self) -> bool {
        self.state() == ReceiverState::Running
    }

    pub fn tempo(&self) -> f64 {
        self.inner.tempo.load()
    }

    pub fn error(&self) -> f64 {
        self.inner.error.load()
    }

    /// Timeline position, in beats, for the given global timestamp. While
    /// not `Running`, returns the frozen anchor beat regardless of `t`.
    pub fn timeline_position_for(&self, t: HostTicks) -> f64 {
        let (anchor_ticks, anchor_beat) = self.inner.anchor.load();
        if self.state() != ReceiverState::Running {
            return anchor_beat;
        }
        let tempo = self.tempo();
        if tempo <= 0.0 {
            return anchor_beat;
        }
        let delta = t.saturating_sub(anchor_ticks);
        anchor_beat + time::ticks_to_beats(delta, tempo)
    }
}

pub struct ClockReceiver {
    filter: TempoFilter,
    state: ReceiverState,
    realtime: Arc<ReceiverRealtime>,
    notifier: Option<NotificationSink>,
    watchdog_deadline: Option<HostTicks>,
    /// Set by `Start`/`Continue`; consumed by the next `Clock`, which
    /// establishes the anchor and transitions to `Running`.
    pending_start_beat: Option<f64>,
    /// Set by a `SongPosition` received before the next `Start`/`Continue`,
    /// or while `Running` for a live seek.
    pending_seek_beat: Option<f64>,
    /// Beat position retained across `Stop`, used as the `Continue` anchor.
    song_position_beats: f64,
}

impl ClockReceiver {
    pub fn new(notifier: Option<NotificationSink>) -> Self {
        Self::with_window(DEFAULT_WINDOW, notifier)
    }

    pub fn with_window(window: usize, notifier: Option<NotificationSink>) -> Self {
        Self {
            filter: TempoFilter::new(window),
            state: ReceiverState::Idle,
            realtime: Arc::new(ReceiverRealtime::new()),
            notifier,
            watchdog_deadline: None,
            pending_start_beat: None,
            pending_seek_beat: None,
            song_position_beats: 0.0,
        }
    }

    /// A cheap handle for realtime-thread reads.
    pub fn handle(&self) -> ClockReceiverHandle {
        ClockReceiverHandle {
            inner: self.realtime.clone(),
        }
    }

    /// Resets to `Idle`, clears the filter window, and drops the anchor.
    /// Call this when the source endpoint changes.
    pub fn reset(&mut self) {
        self.filter.reset();
        self.state = ReceiverState::Idle;
        self.watchdog_deadline = None;
        self.pending_start_beat = None;
        self.pending_seek_beat = None;
        self.song_position_beats = 0.0;
        self.realtime.tempo.store(0.0);
        self.realtime.error.store(0.0);
        self.realtime.anchor.store(0, 0.0);
        self.publish_state();
    }

    /// Dispatch every message in `packets`, in timestamp order. Never
    /// allocates beyond what the tempo filter's fixed-capacity ring buffer
    /// already reserved, and never blocks.
    pub fn receive_packet_list(&mut self, packets: &PacketList) {
        self.check_timeout(time::now());
        for entry in packets.iter() {
            self.dispatch(entry.timestamp, entry.message);
        }
    }

    /// Check the watchdog against `now` and transition to `Idle` if it has
    /// expired. `receive_packet_list` calls this itself; callers with an
    /// otherwise-idle MIDI thread (no incoming messages at all) should also
    /// call this periodically so a dead source is still detected.
    pub fn check_timeout(&mut self, now: HostTicks) {
        if let Some(deadline) = self.watchdog_deadline {
            if now >= deadline && self.state != ReceiverState::Idle {
                let err = ClockError::TimeoutLoss;
                info!("{err}, returning to Idle");
                self.state = ReceiverState::Idle;
                self.watchdog_deadline = None;
                self.publish_state();
                self.notify(ClockEvent::TempoSyncStopped { timestamp: now });
                self.notify(ClockEvent::Stopped { timestamp: now });
            }
        }
    }

    pub fn is_receiving_tempo(&self) -> bool {
        self.state != ReceiverState::Idle
    }

    pub fn is_clock_running(&self) -> bool {
        self.state == ReceiverState::Running
    }

    pub fn tempo(&self) -> f64 {
        self.realtime.tempo.load()
    }

    pub fn error(&self) -> f64 {
        self.realtime.error.load()
    }

    pub fn timeline_position_for(&self, t: HostTicks) -> f64 {
        self.handle().timeline_position_for(t)
    }

    fn dispatch(&mut self, timestamp: HostTicks, message: MidiRealtimeMessage) {
        match message {
            MidiRealtimeMessage::Clock => self.handle_clock(timestamp),
            MidiRealtimeMessage::Start => self.handle_start_or_continue(timestamp, false),
            MidiRealtimeMessage::Continue => self.handle_start_or_continue(timestamp, true),
            MidiRealtimeMessage::Stop => self.handle_stop(timestamp),
            MidiRealtimeMessage::SongPosition(pos) => self.handle_song_position(timestamp, pos),
        }
    }

    fn handle_clock(&mut self, timestamp: HostTicks) {
        let was_idle = self.state == ReceiverState::Idle;
        if was_idle {
            self.state = ReceiverState::ReceivingTempo;
            self.publish_state();
            self.notify(ClockEvent::TempoSyncStarted { timestamp });
        }

        if let Some(estimate) = self.filter.on_tick(timestamp) {
            self.realtime.tempo.store(estimate.tempo);
            self.realtime.error.store(estimate.error);
            debug!("tempo estimate: {:.2} bpm (error {:.4}%)", estimate.tempo, estimate.error);
            self.notify(ClockEvent::TempoChanged {
                timestamp,
                tempo: estimate.tempo,
            });
        }
        let tempo = self.realtime.tempo.load();

        if let Some(beat) = self.pending_start_beat.take() {
            self.realtime.anchor.store(timestamp, beat);
            self.state = ReceiverState::Running;
            self.publish_state();
            info!("clock receiver started at beat {beat}");
            self.notify(ClockEvent::Started { timestamp });
        } else if self.state == ReceiverState::Running {
            if let Some(seek_beat) = self.pending_seek_beat.take() {
                self.realtime.anchor.store(timestamp, seek_beat);
                self.notify(ClockEvent::LiveSeek {
                    timestamp,
                    position: seek_beat,
                });
            } else {
                // Exactly one MIDI tick is 1/24 beat by definition; counting
                // this literally (rather than re-deriving it from elapsed
                // time and the filtered tempo) keeps the anchor's beat
                // component drift-free. The filtered tempo is only used to
                // interpolate *between* ticks, in `timeline_position_for`.
                let (_, beat) = self.realtime.anchor.load();
                self.realtime
                    .anchor
                    .store(timestamp, beat + 1.0 / crate::message::TICKS_PER_BEAT as f64);
            }
        }

        self.arm_watchdog(timestamp, tempo);
    }

    fn arm_watchdog(&mut self, timestamp: HostTicks, tempo: f64) {
        let expected_interval = if tempo > 0.0 {
            60.0 / (tempo * crate::message::TICKS_PER_BEAT as f64)
        } else {
            0.0
        };
        let timeout = (2.0 * expected_interval).max(MIN_WATCHDOG_TIMEOUT_SECS);
        self.watchdog_deadline = Some(timestamp + time::seconds_to_ticks(timeout));
    }

    fn handle_start_or_continue(&mut self, _timestamp: HostTicks, is_continue: bool) {
        if self.state == ReceiverState::Idle {
            let err = ClockError::UnexpectedMessage;
            warn!("{err}: ignoring {} while idle with no tempo", if is_continue { "Continue" } else { "Start" });
            return;
        }
        let default_beat = if is_continue { self.song_position_beats } else { 0.0 };
        let beat = self.pending_seek_beat.take().unwrap_or(default_beat);
        self.pending_start_beat = Some(beat);
    }

    fn handle_stop(&mut self, timestamp: HostTicks) {
        if self.state == ReceiverState::Running {
            let (_, beat) = self.realtime.anchor.load();
            self.song_position_beats = beat;
            self.state = ReceiverState::ReceivingTempo;
            self.publish_state();
            info!("clock receiver stopped at beat {beat}");
            self.notify(ClockEvent::Stopped { timestamp });
        }
        self.pending_start_beat = None;
    }

    fn handle_song_position(&mut self, _timestamp: HostTicks, pos: u16) {
        let beat = pos as f64 / 4.0;
        self.pending_seek_beat = Some(beat);
        if self.state != ReceiverState::Running {
            self.song_position_beats = beat;
        }
        // Live seek: the actual anchor change, and its notification, are
        // deferred to the next Clock to keep the receiver phase-aligned.
    }

    fn publish_state(&self) {
        self.realtime.state.store(self.state as u8, Ordering::Release);
    }

    fn notify(&self, event: ClockEvent) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MidiRealtimeMessage;

    fn steady_clock_packets(start: HostTicks, interval: u64, count: usize) -> Vec<(HostTicks, MidiRealtimeMessage)> {
        (0..count)
            .map(|i| (start + i as u64 * interval, MidiRealtimeMessage::Clock))
            .collect()
    }

    #[test]
    fn steady_receiver_locks_to_two_decimals_while_stopped() {
        let mut receiver = ClockReceiver::new(None);
        for (ts, msg) in steady_clock_packets(0, 20_833, 48) {
            let mut list = PacketList::new();
            list.push(ts, msg);
            receiver.receive_packet_list(&list);
        }
        assert!((receiver.tempo() - 120.0).abs() < 0.05);
        assert!(receiver.error() < 0.01);
        assert!(!receiver.is_clock_running());
        assert!(receiver.is_receiving_tempo());
    }

    #[test]
    fn start_establishes_anchor_on_next_clock() {
        let mut receiver = ClockReceiver::new(None);
        let mut warmup = PacketList::new();
        for (ts, msg) in steady_clock_packets(0, 20_833, 30) {
            warmup.push(ts, msg);
        }
        receiver.receive_packet_list(&warmup);

        let mut start_then_clock = PacketList::new();
        let t_start = 30 * 20_833;
        start_then_clock.push(t_start, MidiRealtimeMessage::Start);
        start_then_clock.push(t_start + 20_833, MidiRealtimeMessage::Clock);
        receiver.receive_packet_list(&start_then_clock);

        assert!(receiver.is_clock_running());
        let pos = receiver.timeline_position_for(t_start + 20_833);
        assert!((pos - 0.0).abs() < 1e-6);
    }

    #[test]
    fn live_seek_while_running_applies_at_next_clock() {
        let mut receiver = ClockReceiver::new(None);
        let mut warmup = PacketList::new();
        for (ts, msg) in steady_clock_packets(0, 20_833, 30) {
            warmup.push(ts, msg);
        }
        warmup.push(30 * 20_833, MidiRealtimeMessage::Start);
        warmup.push(31 * 20_833, MidiRealtimeMessage::Clock);
        receiver.receive_packet_list(&warmup);
        assert!(receiver.is_clock_running());

        let mut seek = PacketList::new();
        let t_seek = 32 * 20_833;
        seek.push(t_seek, MidiRealtimeMessage::SongPosition(8));
        seek.push(t_seek + 20_833, MidiRealtimeMessage::Clock);
        receiver.receive_packet_list(&seek);

        let pos = receiver.timeline_position_for(t_seek + 20_833);
        assert!((pos - 2.0).abs() < 1e-6);
    }

    #[test]
    fn live_seek_while_running_notifies_exactly_once() {
        use crate::transport::notification_channel;

        let (sink, rx) = notification_channel(16);
        let mut receiver = ClockReceiver::new(Some(sink));
        let mut warmup = PacketList::new();
        for (ts, msg) in steady_clock_packets(0, 20_833, 30) {
            warmup.push(ts, msg);
        }
        warmup.push(30 * 20_833, MidiRealtimeMessage::Start);
        warmup.push(31 * 20_833, MidiRealtimeMessage::Clock);
        receiver.receive_packet_list(&warmup);
        while rx.try_recv().is_ok() {}

        let mut seek = PacketList::new();
        let t_seek = 32 * 20_833;
        seek.push(t_seek, MidiRealtimeMessage::SongPosition(8));
        seek.push(t_seek + 20_833, MidiRealtimeMessage::Clock);
        receiver.receive_packet_list(&seek);

        let live_seeks: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|event| matches!(event, ClockEvent::LiveSeek { .. }))
            .collect();
        assert_eq!(live_seeks.len(), 1);
    }

    #[test]
    fn watchdog_times_out_after_silence() {
        let mut receiver = ClockReceiver::new(None);
        let mut warmup = PacketList::new();
        for (ts, msg) in steady_clock_packets(0, 20_833, 30) {
            warmup.push(ts, msg);
        }
        warmup.push(30 * 20_833, MidiRealtimeMessage::Start);
        warmup.push(31 * 20_833, MidiRealtimeMessage::Clock);
        receiver.receive_packet_list(&warmup);
        assert!(receiver.is_clock_running());

        let last_tick = 31 * 20_833;
        let timeout_ticks = time::seconds_to_ticks(0.1);
        receiver.check_timeout(last_tick + timeout_ticks + 1);
        assert!(!receiver.is_receiving_tempo());
        assert!(!receiver.is_clock_running());
    }

    #[test]
    fn stop_then_continue_resumes_from_frozen_position() {
        let mut receiver = ClockReceiver::new(None);
        let mut warmup = PacketList::new();
        for (ts, msg) in steady_clock_packets(0, 20_833, 30) {
            warmup.push(ts, msg);
        }
        warmup.push(30 * 20_833, MidiRealtimeMessage::Start);
        for i in 31..40 {
            warmup.push(i * 20_833, MidiRealtimeMessage::Clock);
        }
        receiver.receive_packet_list(&warmup);
        let frozen = receiver.timeline_position_for(39 * 20_833);

        let mut stop = PacketList::new();
        stop.push(40 * 20_833, MidiRealtimeMessage::Stop);
        receiver.receive_packet_list(&stop);
        assert!(!receiver.is_clock_running());
        assert_eq!(receiver.timeline_position_for(50 * 20_833), frozen);

        let mut resume = PacketList::new();
        resume.push(41 * 20_833, MidiRealtimeMessage::Continue);
        resume.push(42 * 20_833, MidiRealtimeMessage::Clock);
        receiver.receive_packet_list(&resume);
        assert!(receiver.is_clock_running());
        let resumed = receiver.timeline_position_for(42 * 20_833);
        assert!((resumed - frozen).abs() < 1e-6);
    }

    #[test]
    fn reset_on_fresh_receiver_is_a_no_op() {
        let mut receiver = ClockReceiver::new(None);
        receiver.reset();
        assert!(!receiver.is_receiving_tempo());
        assert_eq!(receiver.tempo(), 0.0);
    }

    #[test]
    fn continue_while_idle_without_tempo_is_ignored() {
        let mut receiver = ClockReceiver::new(None);
        let mut list = PacketList::new();
        list.push(0, MidiRealtimeMessage::Continue);
        receiver.receive_packet_list(&list);
        assert!(!receiver.is_receiving_tempo());
        assert!(!receiver.is_clock_running());
    }
}
