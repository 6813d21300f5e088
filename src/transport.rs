//! External interfaces: the capability sets a host application plugs into
//! the sync engine. Kept as narrow traits/structs rather than a deep class
//! hierarchy, so a host only implements what it actually drives.

use crate::error::ClockError;
use crate::message::PacketList;
use crate::time::HostTicks;

/// Downstream transport collaborator used by [`crate::sender::ClockSender`].
///
/// `send` may be invoked from multiple threads, but the sender guarantees
/// it is never invoked concurrently with itself.
pub trait MidiSender: Send {
    fn send(&mut self, packets: &PacketList) -> Result<(), ClockError>;
}

/// A notification emitted by [`crate::receiver::ClockReceiver`], delivered
/// on a non-realtime thread via the channel returned by
/// [`notification_channel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockEvent {
    TempoChanged { timestamp: HostTicks, tempo: f64 },
    Started { timestamp: HostTicks },
    Stopped { timestamp: HostTicks },
    TempoSyncStarted { timestamp: HostTicks },
    TempoSyncStopped { timestamp: HostTicks },
    LiveSeek { timestamp: HostTicks, position: f64 },
}

/// Producer handle for the notification queue. Cloneable and cheap to hold
/// on a realtime thread: `notify` never blocks, dropping the event if the
/// consumer has fallen behind rather than stalling the caller.
#[derive(Clone)]
pub struct NotificationSink {
    tx: crossbeam::channel::Sender<ClockEvent>,
}

impl NotificationSink {
    pub fn notify(&self, event: ClockEvent) {
        let _ = self.tx.try_send(event);
    }
}

/// Create a bounded producer/consumer queue for observer notifications.
/// The consumer side is meant to be drained on a non-realtime (e.g. main or
/// UI) thread.
pub fn notification_channel(capacity: usize) -> (NotificationSink, crossbeam::channel::Receiver<ClockEvent>) {
    let (tx, rx) = crossbeam::channel::bounded(capacity);
    (NotificationSink { tx }, rx)
}

/// An in-memory transport used by tests and the demo binary's dry-run mode:
/// collects every packet list handed to it instead of touching real MIDI
/// hardware.
#[derive(Default)]
pub struct MockTransport {
    pub sent: Vec<PacketList>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MidiSender for MockTransport {
    fn send(&mut self, packets: &PacketList) -> Result<(), ClockError> {
        self.sent.push(packets.clone());
        Ok(())
    }
}
