//! MIDI port discovery and input delivery
//!
//! Uses midir for cross-platform MIDI I/O (ALSA on Linux, CoreMIDI on macOS,
//! WinMM on Windows). A [`BridgeConnection`] holds both halves of a transport
//! session: the input connection whose driver callback feeds the engine, and
//! (through the engine) the output port used for emission. Dropping the
//! connection stops delivery promptly.

use std::sync::PoisonError;

use midir::{MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputPort};

use crate::output::PortSender;
use crate::SharedEngine;

/// Error type for MIDI port operations
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("failed to initialize MIDI input: {0}")]
    InputInit(String),

    #[error("failed to initialize MIDI output: {0}")]
    OutputInit(String),

    #[error("no MIDI input ports available")]
    NoInputPorts,

    #[error("no MIDI output ports available")]
    NoOutputPorts,

    #[error("no MIDI port found matching: {0}")]
    PortNotFound(String),

    #[error("failed to connect to MIDI port: {0}")]
    Connection(String),
}

/// List all available MIDI input port names
pub fn list_input_ports() -> Result<Vec<String>, PortError> {
    let midi_in = MidiInput::new("ccbridge-list").map_err(|e| PortError::InputInit(e.to_string()))?;
    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect())
}

/// List all available MIDI output port names
pub fn list_output_ports() -> Result<Vec<String>, PortError> {
    let midi_out =
        MidiOutput::new("ccbridge-list").map_err(|e| PortError::OutputInit(e.to_string()))?;
    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect())
}

/// Find an input port by display name
///
/// Exact match first, then case-insensitive substring (port names carry
/// hardware-specific suffixes that users rarely type verbatim).
fn find_input_port(midi_in: &MidiInput, name: &str) -> Result<MidiInputPort, PortError> {
    let ports = midi_in.ports();
    if ports.is_empty() {
        return Err(PortError::NoInputPorts);
    }
    let wanted = name.to_lowercase();
    let mut fallback = None;
    for port in ports {
        let Ok(port_name) = midi_in.port_name(&port) else {
            continue;
        };
        if port_name == name {
            return Ok(port);
        }
        if fallback.is_none() && port_name.to_lowercase().contains(&wanted) {
            fallback = Some(port);
        }
    }
    fallback.ok_or_else(|| PortError::PortNotFound(name.to_string()))
}

/// Find an output port by display name (same matching as inputs)
fn find_output_port(midi_out: &MidiOutput, name: &str) -> Result<MidiOutputPort, PortError> {
    let ports = midi_out.ports();
    if ports.is_empty() {
        return Err(PortError::NoOutputPorts);
    }
    let wanted = name.to_lowercase();
    let mut fallback = None;
    for port in ports {
        let Ok(port_name) = midi_out.port_name(&port) else {
            continue;
        };
        if port_name == name {
            return Ok(port);
        }
        if fallback.is_none() && port_name.to_lowercase().contains(&wanted) {
            fallback = Some(port);
        }
    }
    fallback.ok_or_else(|| PortError::PortNotFound(name.to_string()))
}

/// Parse raw MIDI bytes, keeping only Control Change messages
///
/// Status `0xBn cc vv` on any channel. Every other message type (notes,
/// pitch bend, aftertouch, clock) is filtered out before the dispatcher
/// sees it.
fn parse_control_change(data: &[u8]) -> Option<(u8, u8)> {
    if data.len() < 3 {
        return None;
    }
    if data[0] & 0xF0 != 0xB0 {
        return None;
    }
    Some((data[1], data[2]))
}

/// Context owned by the midir callback
struct CallbackContext {
    engine: SharedEngine,
}

/// A live transport session
///
/// Holds the midir input connection alive for the duration; the output half
/// lives inside the engine as a [`PortSender`]. Call [`close`](Self::close)
/// (or drop the session) to stop delivery.
pub struct BridgeConnection {
    _input: MidiInputConnection<CallbackContext>,
    engine: SharedEngine,
    input_port_name: String,
    output_port_name: String,
}

impl BridgeConnection {
    /// Open both ports and start delivering CC events to the engine
    ///
    /// The output port is installed into the engine before the input callback
    /// goes live, so the first dispatched event already has somewhere to emit.
    pub fn open(
        input_name: &str,
        output_name: &str,
        engine: SharedEngine,
    ) -> Result<Self, PortError> {
        let midi_in =
            MidiInput::new("ccbridge-in").map_err(|e| PortError::InputInit(e.to_string()))?;
        let input_port = find_input_port(&midi_in, input_name)?;
        let input_port_name = midi_in
            .port_name(&input_port)
            .unwrap_or_else(|_| input_name.to_string());

        let midi_out =
            MidiOutput::new("ccbridge-out").map_err(|e| PortError::OutputInit(e.to_string()))?;
        let output_port = find_output_port(&midi_out, output_name)?;
        let output_port_name = midi_out
            .port_name(&output_port)
            .unwrap_or_else(|_| output_name.to_string());
        let output_conn = midi_out
            .connect(&output_port, "ccbridge-output")
            .map_err(|e| PortError::Connection(e.to_string()))?;

        engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_output(PortSender::new(output_conn));

        let context = CallbackContext {
            engine: engine.clone(),
        };
        let input_conn = midi_in
            .connect(&input_port, "ccbridge-input", Self::midi_callback, context)
            .map_err(|e| PortError::Connection(e.to_string()))?;

        log::info!(
            "MIDI: connected '{}' -> '{}'",
            input_port_name,
            output_port_name
        );

        Ok(Self {
            _input: input_conn,
            engine,
            input_port_name,
            output_port_name,
        })
    }

    /// The midir callback function
    ///
    /// Called from the MIDI driver thread whenever a message is received.
    /// Must be fast and non-blocking.
    fn midi_callback(_timestamp: u64, data: &[u8], context: &mut CallbackContext) {
        let Some((cc, value)) = parse_control_change(data) else {
            return;
        };
        let mut engine = context
            .engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = engine.on_input_cc(cc, value) {
            // midir delivers 7-bit data bytes, so this is a malformed packet
            log::warn!("MIDI: dropped malformed CC event: {}", e);
        }
    }

    /// Resolved display name of the connected input port
    pub fn input_port_name(&self) -> &str {
        &self.input_port_name
    }

    /// Resolved display name of the connected output port
    pub fn output_port_name(&self) -> &str {
        &self.output_port_name
    }

    /// Stop delivery and tear down the session
    ///
    /// The input connection is dropped first so no further events arrive,
    /// then the engine closes its output port and cancels any pending learn
    /// capture.
    pub fn close(self) {
        let Self { _input, engine, .. } = self;
        drop(_input);
        engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle_disconnect();
        log::info!("MIDI: ports disconnected");
    }
}
