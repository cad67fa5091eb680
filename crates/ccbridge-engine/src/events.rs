//! Notifications emitted by the dispatcher
//!
//! Sent over a bounded flume channel to whatever front-end is listening.
//! Sends never block; when the consumer falls behind, notifications are
//! dropped with a warning rather than stalling the MIDI delivery thread.

use crate::learn::LearnSlot;
use crate::switch::SwitchId;

/// Notification from the engine to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A raw CC event arrived from the controller
    CcReceived {
        /// Incoming CC number
        cc: u8,
        /// Incoming CC value
        value: u8,
    },

    /// A learn capture completed and the switch's mapping was updated
    MappingLearned {
        /// The switch whose mapping changed
        id: SwitchId,
        /// Which mapping slot was written
        slot: LearnSlot,
        /// The captured CC number
        cc: u8,
    },

    /// A switch changed state and an output CC emission was requested
    SwitchStateChanged {
        /// The switch that changed
        id: SwitchId,
        /// The new logical state
        state: bool,
        /// The CC number emitted towards the destination
        output_cc: u8,
    },

    /// An incoming CC had no switch bound to it (advisory, not an error)
    UnmappedCc {
        /// The unmapped CC number
        cc: u8,
    },

    /// An output emission failed; dispatch continues
    SendFailed {
        /// The CC number that could not be sent
        cc: u8,
        /// Human-readable failure description
        reason: String,
    },

    /// The transport closed; any pending learn capture was cancelled
    Disconnected,
}
