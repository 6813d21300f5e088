//! MIDI realtime message types and packet-list framing.
//!
//! Only the realtime/transport messages the sync engine cares about are
//! modelled here; anything else is a no-op to parse and impossible to
//! construct.

use log::warn;

use crate::error::ClockError;
use crate::time::HostTicks;

/// MIDI Clock pulses per quarter note.
pub const TICKS_PER_BEAT: u32 = 24;

/// A Song Position Pointer unit is 1/16 note, i.e. this many Clock ticks.
pub const TICKS_PER_SONG_POSITION_UNIT: u32 = 6;

/// MIDI System Realtime / System Common messages relevant to clock sync.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidiRealtimeMessage {
    Clock,
    Start,
    Continue,
    Stop,
    /// 14-bit Song Position Pointer, in units of 1/16 note (6 clock ticks).
    SongPosition(u16),
}

const STATUS_CLOCK: u8 = 0xF8;
const STATUS_START: u8 = 0xFA;
const STATUS_CONTINUE: u8 = 0xFB;
const STATUS_STOP: u8 = 0xFC;
const STATUS_SONG_POSITION: u8 = 0xF2;

impl MidiRealtimeMessage {
    /// Encode this message to its wire bytes (1 byte, or 3 for Song Position).
    pub fn to_bytes(self) -> Vec<u8> {
        match self {
            MidiRealtimeMessage::Clock => vec![STATUS_CLOCK],
            MidiRealtimeMessage::Start => vec![STATUS_START],
            MidiRealtimeMessage::Continue => vec![STATUS_CONTINUE],
            MidiRealtimeMessage::Stop => vec![STATUS_STOP],
            MidiRealtimeMessage::SongPosition(pos) => {
                let pos = pos & 0x3FFF;
                vec![
                    STATUS_SONG_POSITION,
                    (pos & 0x7F) as u8,
                    ((pos >> 7) & 0x7F) as u8,
                ]
            }
        }
    }

    /// Parse a single message from the front of `bytes`, returning the
    /// message and the number of bytes consumed. Returns `None` for a
    /// byte sequence this engine does not care about (channel voice
    /// messages, SysEx, any other unrecognized status byte) — those are
    /// ignored, not erroneous. A recognized Song Position status byte
    /// with too few trailing bytes to complete the 14-bit value is a
    /// malformed packet: it is logged and skipped rather than silently
    /// dropped.
    pub fn parse(bytes: &[u8]) -> Option<(MidiRealtimeMessage, usize)> {
        match *bytes.first()? {
            STATUS_CLOCK => Some((MidiRealtimeMessage::Clock, 1)),
            STATUS_START => Some((MidiRealtimeMessage::Start, 1)),
            STATUS_CONTINUE => Some((MidiRealtimeMessage::Continue, 1)),
            STATUS_STOP => Some((MidiRealtimeMessage::Stop, 1)),
            STATUS_SONG_POSITION => match (bytes.get(1), bytes.get(2)) {
                (Some(&lsb), Some(&msb)) => {
                    let pos = (lsb as u16 & 0x7F) | ((msb as u16 & 0x7F) << 7);
                    Some((MidiRealtimeMessage::SongPosition(pos), 3))
                }
                _ => {
                    warn!("{}: truncated Song Position Pointer ({} byte(s))", ClockError::MalformedPacket, bytes.len());
                    None
                }
            },
            _ => None,
        }
    }
}

/// A single timestamped message, as delivered by or to a transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedMessage {
    pub timestamp: HostTicks,
    pub message: MidiRealtimeMessage,
}

impl TimedMessage {
    pub fn new(timestamp: HostTicks, message: MidiRealtimeMessage) -> Self {
        Self { timestamp, message }
    }
}

/// An ordered list of timestamped messages, coalesced the way a platform
/// packet-list container would be: one allocation, messages in timestamp
/// order. This is the unit exchanged with the transport collaborator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketList {
    messages: Vec<TimedMessage>,
}

impl PacketList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, timestamp: HostTicks, message: MidiRealtimeMessage) {
        self.messages.push(TimedMessage::new(timestamp, message));
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimedMessage> {
        self.messages.iter()
    }

    pub fn into_messages(self) -> Vec<TimedMessage> {
        self.messages
    }

    /// Build the wire encoding of this packet list: each entry is an
    /// 8-byte little-endian timestamp, a 1-byte length, then the message
    /// bytes. This mirrors what a platform packet-list builder does
    /// internally, without depending on a specific platform API.
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.messages {
            out.extend_from_slice(&entry.timestamp.to_le_bytes());
            let bytes = entry.message.to_bytes();
            out.push(bytes.len() as u8);
            out.extend_from_slice(&bytes);
        }
        out
    }

    /// Parse a packet list previously produced by [`PacketList::build`].
    pub fn parse(bytes: &[u8]) -> PacketList {
        let mut messages = Vec::new();
        let mut offset = 0;
        while offset + 9 <= bytes.len() {
            let timestamp = HostTicks::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap());
            let len = bytes[offset + 8] as usize;
            offset += 9;
            if offset + len > bytes.len() {
                break;
            }
            if let Some((message, _consumed)) = MidiRealtimeMessage::parse(&bytes[offset..offset + len]) {
                messages.push(TimedMessage::new(timestamp, message));
            }
            offset += len;
        }
        PacketList { messages }
    }
}

impl FromIterator<TimedMessage> for PacketList {
    fn from_iter<T: IntoIterator<Item = TimedMessage>>(iter: T) -> Self {
        PacketList {
            messages: iter.into_iter().collect(),
        }
    }
}
