//! Outbound CC emission
//!
//! The dispatcher talks to the destination through the [`CcSender`] trait;
//! [`PortSender`] is the midir-backed implementation. Send failures are
//! advisory by design: MIDI CC traffic is a lossy best-effort stream, so a
//! failed message is logged and discarded, never retried.

use midir::MidiOutputConnection;

use crate::switch::MIDI_DATA_MAX;

/// Error from an attempted CC send
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// CC number or value outside the 7-bit MIDI range
    #[error("CC number or value out of MIDI range (0-127): {0}")]
    InvalidRange(u8),

    /// No output port is open
    #[error("no output port connected")]
    NotConnected,

    /// The MIDI backend refused the message
    #[error("MIDI send failed: {0}")]
    Backend(String),
}

/// Sink for output CC messages
///
/// Implementations must return promptly on failure; a closed transport is an
/// immediate error, never a hang of the delivery loop.
pub trait CcSender {
    /// Send a Control Change message
    fn send_cc(&mut self, control: u8, value: u8) -> Result<(), SendError>;

    /// Whether an output transport is currently open
    fn is_connected(&self) -> bool;

    /// Release the underlying transport, if any
    fn close(&mut self) {}
}

/// midir-backed [`CcSender`]
///
/// Messages go out on MIDI channel 0; the bridge speaks a single-channel
/// protocol.
pub struct PortSender {
    connection: Option<MidiOutputConnection>,
}

impl PortSender {
    /// Wrap an open output connection
    pub fn new(connection: MidiOutputConnection) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    /// A sender with no port; every send fails with `NotConnected`
    pub fn disconnected() -> Self {
        Self { connection: None }
    }
}

impl CcSender for PortSender {
    fn send_cc(&mut self, control: u8, value: u8) -> Result<(), SendError> {
        if control > MIDI_DATA_MAX {
            return Err(SendError::InvalidRange(control));
        }
        if value > MIDI_DATA_MAX {
            return Err(SendError::InvalidRange(value));
        }
        let Some(connection) = self.connection.as_mut() else {
            return Err(SendError::NotConnected);
        };
        log::debug!("[MIDI OUT] CC cc={:#04x} val={}", control, value);
        connection
            .send(&[0xB0, control, value])
            .map_err(|e| SendError::Backend(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn close(&mut self) {
        if self.connection.take().is_some() {
            log::info!("MIDI: output port closed");
        }
    }
}
