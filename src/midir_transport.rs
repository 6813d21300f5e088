//! `midir`-backed [`MidiSender`] output adapter and [`MidirClockInput`]
//! input adapter.
//!
//! Gated behind the `midir-backend` feature so the default build never
//! needs a system MIDI backend (ALSA/CoreMIDI/WinMM). Mirrors the source
//! project's `midi::MidirEngine`.

use std::sync::{Arc, Mutex};

use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use crate::error::ClockError;
use crate::message::{MidiRealtimeMessage, PacketList};
use crate::receiver::ClockReceiver;
use crate::time;
use crate::transport::MidiSender;

pub struct MidirTransport {
    connection: MidiOutputConnection,
}

impl MidirTransport {
    /// Opens the named output port. `client_name` identifies this process
    /// to the platform MIDI subsystem.
    pub fn open(client_name: &str, port_name: &str) -> Result<Self, ClockError> {
        let output = MidiOutput::new(client_name)
            .map_err(|e| ClockError::TransportFailure(e.to_string()))?;
        let port = output
            .ports()
            .into_iter()
            .find(|p| output.port_name(p).map(|n| n == port_name).unwrap_or(false))
            .ok_or_else(|| ClockError::TransportFailure(format!("no such MIDI port: {port_name}")))?;
        let connection = output
            .connect(&port, client_name)
            .map_err(|e| ClockError::TransportFailure(e.to_string()))?;
        Ok(Self { connection })
    }

    /// Lists the names of the available MIDI output ports.
    pub fn available_ports(client_name: &str) -> Result<Vec<String>, ClockError> {
        let output = MidiOutput::new(client_name)
            .map_err(|e| ClockError::TransportFailure(e.to_string()))?;
        Ok(output
            .ports()
            .iter()
            .filter_map(|p| output.port_name(p).ok())
            .collect())
    }
}

impl MidiSender for MidirTransport {
    /// Sends each message's raw bytes in order. `midir` does not expose a
    /// platform packet-list scheduler, so this adapter sends each message
    /// as soon as it is handed a packet list rather than honoring its
    /// timestamps precisely — acceptable for the demo binary, noted as a
    /// limitation rather than hidden.
    fn send(&mut self, packets: &PacketList) -> Result<(), ClockError> {
        for entry in packets.iter() {
            self.connection
                .send(&entry.message.to_bytes())
                .map_err(|e| ClockError::TransportFailure(e.to_string()))?;
        }
        Ok(())
    }
}

/// A live MIDI input port feeding a [`ClockReceiver`] directly from its
/// callback thread. The connection must be kept alive for as long as the
/// receiver should keep listening; dropping it closes the port.
pub struct MidirClockInput {
    _connection: MidiInputConnection<()>,
}

impl MidirClockInput {
    /// Opens the named input port and wires every recognized realtime byte
    /// it delivers into `receiver`. `midir`'s callback runs on its own
    /// thread, so `receiver` is shared behind a [`Mutex`]: this is the
    /// one case where `ClockReceiver` is driven from outside its owning
    /// thread, since `midir` itself owns that thread.
    pub fn open(
        client_name: &str,
        port_name: &str,
        receiver: Arc<Mutex<ClockReceiver>>,
    ) -> Result<Self, ClockError> {
        let input = MidiInput::new(client_name)
            .map_err(|e| ClockError::TransportFailure(e.to_string()))?;
        let port = input
            .ports()
            .into_iter()
            .find(|p| input.port_name(p).map(|n| n == port_name).unwrap_or(false))
            .ok_or_else(|| ClockError::TransportFailure(format!("no such MIDI port: {port_name}")))?;

        let connection = input
            .connect(
                &port,
                client_name,
                move |_midir_timestamp_us, bytes, _| {
                    // `midir` stamps callbacks against its own connection
                    // epoch; stamp against ours instead so these timestamps
                    // stay comparable to the ones `check_timeout` uses.
                    let arrival = time::now();
                    if let Some((message, _consumed)) = MidiRealtimeMessage::parse(bytes) {
                        let mut packets = PacketList::new();
                        packets.push(arrival, message);
                        if let Ok(mut receiver) = receiver.lock() {
                            receiver.receive_packet_list(&packets);
                        }
                    }
                },
                (),
            )
            .map_err(|e| ClockError::TransportFailure(e.to_string()))?;

        Ok(Self {
            _connection: connection,
        })
    }

    /// Lists the names of the available MIDI input ports.
    pub fn available_ports(client_name: &str) -> Result<Vec<String>, ClockError> {
        let input = MidiInput::new(client_name)
            .map_err(|e| ClockError::TransportFailure(e.to_string()))?;
        Ok(input
            .ports()
            .iter()
            .filter_map(|p| input.port_name(p).ok())
            .collect())
    }
}
