//! Bidirectional MIDI Clock synchronization engine: a tempo-paced
//! [`sender::ClockSender`] and a tempo-tracking [`receiver::ClockReceiver`],
//! sharing a wire format, a time base, and lock-free realtime/control
//! primitives.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod realtime;
pub mod receiver;
pub mod scheduler;
pub mod sender;
pub mod tempo_filter;
pub mod time;
pub mod transport;

#[cfg(feature = "midir-backend")]
pub mod midir_transport;

pub use error::ClockError;
pub use receiver::{ClockReceiver, ClockReceiverHandle};
pub use sender::{ClockSender, ClockSenderHandle};
pub use time::HostTicks;
