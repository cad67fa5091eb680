//! Engine error taxonomy
//!
//! Every variant is recoverable: callers surface the error to the user and
//! carry on. The dispatch loop itself never propagates a fatal error.

use crate::switch::SwitchId;

/// Errors returned by registry and dispatch operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A CC number or value outside the 7-bit MIDI range
    #[error("CC number or value out of MIDI range (0-127): {0}")]
    InvalidRange(u8),

    /// Operation referenced a switch id the registry does not hold
    #[error("no switch with id {0}")]
    NotFound(SwitchId),

    /// Deletion attempted on a startup switch
    #[error("switch {0} is protected and cannot be deleted")]
    Protected(SwitchId),

    /// Creation attempted at the configured switch maximum
    #[error("switch limit reached ({0})")]
    CapacityExceeded(usize),
}
