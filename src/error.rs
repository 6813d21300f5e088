//! Error kinds for the sync engine.
//!
//! Realtime-path errors (`MalformedPacket`, `UnexpectedMessage`,
//! `TimeoutLoss`) are never returned to a caller: they are logged via their
//! `Display` impl and recovered internally via a state transition.
//! Control-path errors (`TempoUnset`, `TransportFailure`) are returned
//! synchronously from the API that detected them.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ClockError {
    /// A packet's status byte indicated more data than was present.
    MalformedPacket,
    /// A message arrived that is meaningless in the current state, e.g.
    /// `Continue` while `Idle` with no tempo established yet.
    UnexpectedMessage,
    /// `start()` was called with no tempo set (tempo == 0).
    TempoUnset,
    /// The receiver's watchdog fired: no `Clock` within the timeout window.
    TimeoutLoss,
    /// The downstream transport collaborator failed to send a packet list.
    TransportFailure(String),
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::MalformedPacket => write!(f, "malformed MIDI packet"),
            ClockError::UnexpectedMessage => write!(f, "unexpected message for current state"),
            ClockError::TempoUnset => write!(f, "cannot start: tempo has not been set"),
            ClockError::TimeoutLoss => write!(f, "clock watchdog timed out"),
            ClockError::TransportFailure(reason) => write!(f, "transport failure: {reason}"),
        }
    }
}

impl std::error::Error for ClockError {}
