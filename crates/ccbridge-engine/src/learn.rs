//! Interactive CC-assignment workflow
//!
//! One learning session exists per connection. Arming it for a switch makes
//! the dispatcher divert the next incoming CC event into that switch's input
//! or output mapping instead of toggling state.

use crate::switch::SwitchId;

/// Which mapping slot a capture writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnSlot {
    /// The CC number the controller sends
    Input,
    /// The CC number the bridge emits
    Output,
}

/// Learning session state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LearnState {
    /// No capture pending
    #[default]
    Idle,
    /// Next CC event becomes the switch's input mapping
    AwaitingInput(SwitchId),
    /// Next CC event becomes the switch's output mapping
    AwaitingOutput(SwitchId),
}

/// Single learning session, driven by the dispatcher
///
/// A pending capture waits indefinitely; only the next CC event or an
/// explicit cancel (including disconnect) clears it. A new start request
/// while a capture is pending overwrites the pending target.
#[derive(Debug, Default)]
pub struct LearnSession {
    state: LearnState,
}

impl LearnSession {
    /// Current state
    pub fn state(&self) -> LearnState {
        self.state
    }

    /// Whether a capture is pending
    pub fn is_active(&self) -> bool {
        self.state != LearnState::Idle
    }

    /// Arm an input-CC capture for `id`
    pub fn start_input(&mut self, id: SwitchId) {
        self.state = LearnState::AwaitingInput(id);
    }

    /// Arm an output-CC capture for `id`
    pub fn start_output(&mut self, id: SwitchId) {
        self.state = LearnState::AwaitingOutput(id);
    }

    /// Drop any pending capture
    pub fn cancel(&mut self) {
        self.state = LearnState::Idle;
    }

    /// Consume the pending capture, returning the target and slot
    ///
    /// The session is back to `Idle` afterwards regardless of what the caller
    /// does with the result.
    pub fn take_pending(&mut self) -> Option<(SwitchId, LearnSlot)> {
        match std::mem::take(&mut self.state) {
            LearnState::Idle => None,
            LearnState::AwaitingInput(id) => Some((id, LearnSlot::Input)),
            LearnState::AwaitingOutput(id) => Some((id, LearnSlot::Output)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_consumes_state() {
        let mut session = LearnSession::default();
        assert!(!session.is_active());
        assert_eq!(session.take_pending(), None);

        session.start_input(SwitchId::new(2));
        assert!(session.is_active());
        assert_eq!(
            session.take_pending(),
            Some((SwitchId::new(2), LearnSlot::Input))
        );
        assert_eq!(session.state(), LearnState::Idle);
        assert_eq!(session.take_pending(), None);
    }

    #[test]
    fn test_output_capture() {
        let mut session = LearnSession::default();
        session.start_output(SwitchId::new(7));
        assert_eq!(session.state(), LearnState::AwaitingOutput(SwitchId::new(7)));
        assert_eq!(
            session.take_pending(),
            Some((SwitchId::new(7), LearnSlot::Output))
        );
    }

    #[test]
    fn test_new_request_overwrites_pending() {
        let mut session = LearnSession::default();
        session.start_input(SwitchId::new(1));
        session.start_output(SwitchId::new(3));
        assert_eq!(
            session.take_pending(),
            Some((SwitchId::new(3), LearnSlot::Output))
        );
    }

    #[test]
    fn test_cancel_clears_pending() {
        let mut session = LearnSession::default();
        session.start_input(SwitchId::new(0));
        session.cancel();
        assert_eq!(session.state(), LearnState::Idle);
        assert_eq!(session.take_pending(), None);
    }
}
