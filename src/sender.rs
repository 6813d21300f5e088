//! Clock Sender: a tempo-paced tick scheduler that emits MIDI timing
//! messages at precise future timestamps and coordinates transport
//! start/stop/seek.
//!
//! The scheduler thread and the control-thread API both mutate [`Inner`]
//! behind a single lock; the transport `send` call is serialised through
//! its own lock so it is never invoked concurrently with itself, matching
//! the `MidiSender` contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::error::ClockError;
use crate::message::{MidiRealtimeMessage, PacketList, TICKS_PER_BEAT};
use crate::realtime::{AtomicF64, SeqLockPair};
use crate::scheduler::{Scheduler, ThreadScheduler};
use crate::time::{self, HostTicks};
use crate::transport::MidiSender;

/// How far ahead of "now" ticks are scheduled into the transport.
pub const DEFAULT_LOOKAHEAD: Duration = Duration::from_millis(100);
/// Added to "now" when the caller passes a zero apply time.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_millis(10);
/// Control-plane timer wake period.
pub const DEFAULT_WAKE_INTERVAL: Duration = Duration::from_millis(10);

fn tick_interval_seconds(tempo: f64) -> f64 {
    60.0 / (tempo * TICKS_PER_BEAT as f64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SenderState {
    Stopped,
    Running,
    SeekPending { apply_time: HostTicks, new_beat: f64 },
}

struct PendingSeek {
    apply_time: HostTicks,
    new_beat: f64,
}

struct Inner {
    tempo: f64,
    state: SenderState,
    cued_timeline_position: f64,
    send_clock_while_stopped: bool,
    next_tick_time: HostTicks,
    tick_interval_secs: f64,
    /// Ticks committed to the transport since the current `Running` anchor
    /// was established; used for phase-safe seek alignment.
    tick_counter: u64,
    /// Timestamp of the most recently committed tick.
    committed_through: HostTicks,
    pending_seek: Option<PendingSeek>,
}

struct SenderRealtime {
    tempo: AtomicF64,
    running: AtomicBool,
    cued_position: AtomicF64,
    /// (anchor host ticks, anchor beat)
    anchor: SeqLockPair,
}

impl SenderRealtime {
    fn new() -> Self {
        Self {
            tempo: AtomicF64::new(0.0),
            running: AtomicBool::new(false),
            cued_position: AtomicF64::new(0.0),
            anchor: SeqLockPair::new(0, 0.0),
        }
    }
}

/// Cheap, cloneable handle for realtime-thread reads of the sender's
/// timeline, mirroring [`crate::receiver::ClockReceiverHandle`].
#[derive(Clone)]
pub struct ClockSenderHandle {
    inner: Arc<SenderRealtime>,
}

impl ClockSenderHandle {
    pub fn timeline_position_for(&self, t: HostTicks) -> f64 {
        if !self.inner.running.load(Ordering::Acquire) {
            return self.inner.cued_position.load();
        }
        let tempo = self.inner.tempo.load();
        let (anchor_ticks, anchor_beat) = self.inner.anchor.load();
        if tempo <= 0.0 {
            return anchor_beat;
        }
        let delta = t.saturating_sub(anchor_ticks);
        anchor_beat + time::ticks_to_beats(delta, tempo)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }
}

pub struct ClockSender {
    inner: Arc<Mutex<Inner>>,
    transport: Arc<Mutex<Box<dyn MidiSender>>>,
    realtime: Arc<SenderRealtime>,
    thread_running: Arc<AtomicBool>,
    safety_margin: Duration,
}

impl ClockSender {
    pub fn new(transport: Box<dyn MidiSender>) -> Self {
        Self::with_config(transport, DEFAULT_LOOKAHEAD, DEFAULT_SAFETY_MARGIN, DEFAULT_WAKE_INTERVAL)
    }

    pub fn with_config(
        transport: Box<dyn MidiSender>,
        lookahead: Duration,
        safety_margin: Duration,
        wake_interval: Duration,
    ) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            tempo: 0.0,
            state: SenderState::Stopped,
            cued_timeline_position: 0.0,
            send_clock_while_stopped: false,
            next_tick_time: 0,
            tick_interval_secs: 0.0,
            tick_counter: 0,
            committed_through: 0,
            pending_seek: None,
        }));
        let realtime = Arc::new(SenderRealtime::new());
        let transport = Arc::new(Mutex::new(transport));
        let thread_running = Arc::new(AtomicBool::new(true));

        spawn_scheduler_loop(
            Box::new(ThreadScheduler::new()),
            inner.clone(),
            transport.clone(),
            realtime.clone(),
            thread_running.clone(),
            lookahead,
            wake_interval,
        );

        Self {
            inner,
            transport,
            realtime,
            thread_running,
            safety_margin,
        }
    }

    pub fn handle(&self) -> ClockSenderHandle {
        ClockSenderHandle {
            inner: self.realtime.clone(),
        }
    }

    pub fn set_tempo(&mut self, bpm: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.tempo = bpm;
        if bpm > 0.0 {
            inner.tick_interval_secs = tick_interval_seconds(bpm);
        }
        self.realtime.tempo.store(bpm);
        debug!(
            "sender tempo set to {bpm} bpm, effective for ticks after {}",
            inner.committed_through
        );
    }

    /// Timestamp of the most recently committed tick. A tempo change only
    /// affects ticks scheduled after this point; anything already committed
    /// to the transport keeps the rate it was sent at.
    pub fn committed_through(&self) -> HostTicks {
        self.inner.lock().unwrap().committed_through
    }

    /// While `Stopped`, cues the position for the next `start()`. While
    /// running, defers to [`ClockSender::set_active_timeline_position`].
    pub fn set_timeline_position(&mut self, beats: f64) {
        let is_stopped = matches!(self.inner.lock().unwrap().state, SenderState::Stopped);
        if is_stopped {
            let mut inner = self.inner.lock().unwrap();
            inner.cued_timeline_position = beats;
            self.realtime.cued_position.store(beats);
        } else {
            self.set_active_timeline_position(beats, 0);
        }
    }

    pub fn set_active_timeline_position(&mut self, beats: f64, apply_time: HostTicks) -> HostTicks {
        let mut inner = self.inner.lock().unwrap();
        if matches!(inner.state, SenderState::Stopped) {
            inner.cued_timeline_position = beats;
            self.realtime.cued_position.store(beats);
            return 0;
        }
        let now = time::now();
        let chosen = if apply_time == 0 {
            self.phase_safe_seek_time(now, &inner)
        } else {
            apply_time
        };
        inner.state = SenderState::SeekPending {
            apply_time: chosen,
            new_beat: beats,
        };
        inner.pending_seek = Some(PendingSeek {
            apply_time: chosen,
            new_beat: beats,
        });
        chosen
    }

    pub fn timeline_position_for(&self, t: HostTicks) -> f64 {
        self.handle().timeline_position_for(t)
    }

    pub fn set_send_clock_while_stopped(&mut self, enabled: bool) {
        self.inner.lock().unwrap().send_clock_while_stopped = enabled;
    }

    /// Starts the transport. Returns the chosen apply time, or
    /// [`ClockError::TempoUnset`] if no tempo has been set.
    pub fn start(&mut self, apply_time: HostTicks) -> Result<HostTicks, ClockError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.tempo <= 0.0 {
            return Err(ClockError::TempoUnset);
        }
        let now = time::now();
        let chosen = if apply_time == 0 {
            now + to_ticks(self.safety_margin)
        } else {
            apply_time
        };

        let beat = inner.cued_timeline_position;
        let mut packets = PacketList::new();
        if beat > 0.0 {
            packets.push(chosen, MidiRealtimeMessage::SongPosition(beat_to_song_position(beat)));
        }
        let start_message = if beat > 0.0 {
            MidiRealtimeMessage::Continue
        } else {
            MidiRealtimeMessage::Start
        };
        packets.push(chosen, start_message);
        self.send_locked(&packets)?;

        inner.state = SenderState::Running;
        inner.next_tick_time = chosen;
        inner.tick_interval_secs = tick_interval_seconds(inner.tempo);
        inner.tick_counter = 0;
        inner.committed_through = chosen.saturating_sub(1);
        self.realtime.anchor.store(chosen, beat);
        self.realtime.running.store(true, Ordering::Release);
        info!("sender starting at tick {chosen} (beat {beat})");
        Ok(chosen)
    }

    /// Emits `Stop` immediately, leaves tempo unchanged, zeroes the cued
    /// timeline position. Idempotent: calling this twice has the same
    /// effect as once.
    pub fn stop(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        let now = time::now();
        let mut packets = PacketList::new();
        packets.push(now, MidiRealtimeMessage::Stop);
        let _ = self.send_locked_raw(&packets);

        inner.state = SenderState::Stopped;
        inner.cued_timeline_position = 0.0;
        inner.pending_seek = None;
        self.realtime.cued_position.store(0.0);
        self.realtime.running.store(false, Ordering::Release);
        info!("sender stopped");
    }

    fn send_locked(&self, packets: &PacketList) -> Result<(), ClockError> {
        self.send_locked_raw(packets)
    }

    fn send_locked_raw(&self, packets: &PacketList) -> Result<(), ClockError> {
        self.transport.lock().unwrap().send(packets)
    }

    /// Spec §4.5's phase-safe apply-time selection for a seek: round the
    /// earliest safe candidate up to the next tick boundary whose phase,
    /// relative to the running anchor, lands on a 1/16-note grid point
    /// (every 6th 24-ppq tick).
    fn phase_safe_seek_time(&self, now: HostTicks, inner: &Inner) -> HostTicks {
        let safety = to_ticks(self.safety_margin);
        let candidate = (now + safety).max(inner.next_tick_time);
        if inner.tick_interval_secs <= 0.0 {
            return candidate;
        }
        let tick_interval_ticks = time::seconds_to_ticks(inner.tick_interval_secs).max(1);
        let delta = candidate.saturating_sub(inner.next_tick_time);
        let ticks_ahead = delta.div_ceil(tick_interval_ticks);
        let absolute_tick = inner.tick_counter + ticks_ahead;
        let phase = absolute_tick % 6;
        let rounded_absolute_tick = if phase == 0 { absolute_tick } else { absolute_tick + (6 - phase) };
        let final_ticks_ahead = rounded_absolute_tick - inner.tick_counter;
        inner.next_tick_time + final_ticks_ahead * tick_interval_ticks
    }
}

impl Drop for ClockSender {
    fn drop(&mut self) {
        self.thread_running.store(false, Ordering::Release);
    }
}

fn to_ticks(d: Duration) -> HostTicks {
    time::seconds_to_ticks(d.as_secs_f64())
}

fn beat_to_song_position(beat: f64) -> u16 {
    ((beat * 4.0).round() as i64).clamp(0, 0x3FFF) as u16
}

/// Background tick-generation loop, spawned once per [`ClockSender`].
/// Wakes on `wake_interval`, flushes every tick whose timestamp falls
/// within `now + lookahead` into a single packet list, and applies any
/// pending start/seek whose apply time has arrived.
#[allow(clippy::too_many_arguments)]
fn spawn_scheduler_loop(
    scheduler: Box<dyn Scheduler>,
    inner: Arc<Mutex<Inner>>,
    transport: Arc<Mutex<Box<dyn MidiSender>>>,
    realtime: Arc<SenderRealtime>,
    running: Arc<AtomicBool>,
    lookahead: Duration,
    wake_interval: Duration,
) {
    scheduler.spawn(Box::new(move || {
        while running.load(Ordering::Acquire) {
            thread::sleep(wake_interval);
            let mut guard = inner.lock().unwrap();
            let now = time::now();
            let horizon = now + to_ticks(lookahead);
            let mut packets = PacketList::new();

            let running_now = matches!(guard.state, SenderState::Running | SenderState::SeekPending { .. });
            if !running_now && !guard.send_clock_while_stopped {
                continue;
            }
            if guard.tempo <= 0.0 {
                continue;
            }
            if guard.tick_interval_secs <= 0.0 {
                guard.tick_interval_secs = tick_interval_seconds(guard.tempo);
            }
            let tick_interval_ticks = time::seconds_to_ticks(guard.tick_interval_secs).max(1);
            if guard.next_tick_time == 0 && !running_now {
                guard.next_tick_time = now;
            }

            while guard.next_tick_time <= horizon {
                if let Some(seek) = guard.pending_seek.as_ref() {
                    if seek.apply_time <= guard.next_tick_time {
                        let seek = guard.pending_seek.take().unwrap();
                        packets.push(
                            seek.apply_time,
                            MidiRealtimeMessage::SongPosition(beat_to_song_position(seek.new_beat)),
                        );
                        realtime.anchor.store(seek.apply_time, seek.new_beat);
                        guard.state = SenderState::Running;
                        guard.tick_counter = 0;
                    }
                }

                if running_now || guard.send_clock_while_stopped {
                    packets.push(guard.next_tick_time, MidiRealtimeMessage::Clock);
                }
                if matches!(guard.state, SenderState::Running) {
                    let (_, beat) = realtime.anchor.load();
                    realtime
                        .anchor
                        .store(guard.next_tick_time, beat + 1.0 / TICKS_PER_BEAT as f64);
                }
                guard.committed_through = guard.next_tick_time;
                guard.tick_counter += 1;
                guard.next_tick_time += tick_interval_ticks;
            }

            drop(guard);
            if !packets.is_empty() {
                let _ = transport.lock().unwrap().send(&packets);
            }
        }
    }));
}
