//! Hardware MIDI through midir
//!
//! Ports are picked by the first name containing a pattern. Listing and
//! choosing devices is left to the caller.

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use tracing::{info, warn};

use super::input::DrumMap;
use super::midi::MidiEvent;
use super::port::OutputPort;
use crate::context::Trigger;
use crate::error::TransportError;

const CLIENT_NAME: &str = "backbeat";

/// Connected MIDI output
pub struct MidirOutput {
    connection: Mutex<Option<MidiOutputConnection>>,
    pub port_name: String,
}

impl MidirOutput {
    /// Connect to the first output whose name contains `port_pattern`
    pub fn open(port_pattern: &str) -> Result<Self, TransportError> {
        let midi_out =
            MidiOutput::new(CLIENT_NAME).map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|name| name.contains(port_pattern))
                    .unwrap_or(false)
            })
            .ok_or_else(|| TransportError::PortNotFound(port_pattern.to_string()))?;

        let port_name = midi_out
            .port_name(port)
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let connection = midi_out
            .connect(port, "backbeat-out")
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        info!(port = %port_name, "opened MIDI output");
        Ok(Self {
            connection: Mutex::new(Some(connection)),
            port_name,
        })
    }

    pub fn close(&self) {
        let mut connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(conn) = connection.take() {
            conn.close();
            info!(port = %self.port_name, "closed MIDI output");
        }
    }
}

impl OutputPort for MidirOutput {
    fn send(&self, event: MidiEvent) -> Result<(), TransportError> {
        let mut connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        match connection.as_mut() {
            Some(conn) => conn
                .send(&event.to_bytes())
                .map_err(|e| TransportError::SendFailed(e.to_string())),
            None => Err(TransportError::Disconnected),
        }
    }
}

impl Drop for MidirOutput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connected drum input, delivering triggers to a callback
pub struct MidirInput {
    connection: Option<MidiInputConnection<()>>,
    pub port_name: String,
}

impl MidirInput {
    /// Connect to the first input whose name contains `port_pattern`
    ///
    /// `on_trigger` runs on midir's thread for every mapped drum hit.
    pub fn open<F>(port_pattern: &str, drum_map: DrumMap, mut on_trigger: F) -> Result<Self, TransportError>
    where
        F: FnMut(Trigger) + Send + 'static,
    {
        let midi_in =
            MidiInput::new(CLIENT_NAME).map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let ports = midi_in.ports();
        let port = ports
            .iter()
            .find(|p| {
                midi_in
                    .port_name(p)
                    .map(|name| name.contains(port_pattern))
                    .unwrap_or(false)
            })
            .ok_or_else(|| TransportError::PortNotFound(port_pattern.to_string()))?;

        let port_name = midi_in
            .port_name(port)
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let connection = midi_in
            .connect(
                port,
                "backbeat-in",
                move |_timestamp_us, data, _| {
                    // midir timestamps have an unspecified epoch; stamp on arrival
                    if let Some(trigger) = drum_map.trigger_from_bytes(data, Instant::now()) {
                        on_trigger(trigger);
                    }
                },
                (),
            )
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        info!(port = %port_name, "opened MIDI input");
        Ok(Self {
            connection: Some(connection),
            port_name,
        })
    }

    pub fn close(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
            info!(port = %self.port_name, "closed MIDI input");
        }
    }
}

impl Drop for MidirInput {
    fn drop(&mut self) {
        if self.connection.is_some() {
            warn!(port = %self.port_name, "MIDI input dropped while connected");
        }
        self.close();
    }
}
