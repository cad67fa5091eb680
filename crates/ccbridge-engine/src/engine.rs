//! Event dispatch
//!
//! The [`Engine`] owns all mutable session state: the switch registry, the
//! learning session and the output half of the transport. Every incoming CC
//! event either satisfies a pending learn capture or is resolved to a switch
//! and applied through that switch's mode policy. Front-end mutations are
//! routed through the engine too, so a single lock around it serializes the
//! whole session.

use flume::Sender;

use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::learn::{LearnSession, LearnSlot, LearnState};
use crate::output::CcSender;
use crate::switch::{Switch, SwitchId, SwitchMode, SwitchRegistry, MIDI_DATA_MAX};

/// The dispatcher at the center of a bridge session
pub struct Engine<S: CcSender> {
    registry: SwitchRegistry,
    learn: LearnSession,
    output: S,
    events: Sender<EngineEvent>,
}

impl<S: CcSender> Engine<S> {
    /// Build an engine around a registry, an output sender and an event channel
    pub fn new(registry: SwitchRegistry, output: S, events: Sender<EngineEvent>) -> Self {
        Self {
            registry,
            learn: LearnSession::default(),
            output,
            events,
        }
    }

    /// Entry point for incoming Control Change events
    ///
    /// Invoked from the MIDI delivery thread for every CC the controller
    /// sends. Expected conditions (pending capture, unmapped CC, send
    /// failure) are reported as events, never as errors; only CC bytes
    /// outside the 7-bit range are rejected.
    pub fn on_input_cc(&mut self, cc: u8, value: u8) -> Result<(), EngineError> {
        if cc > MIDI_DATA_MAX {
            return Err(EngineError::InvalidRange(cc));
        }
        if value > MIDI_DATA_MAX {
            return Err(EngineError::InvalidRange(value));
        }
        self.emit(EngineEvent::CcReceived { cc, value });

        // A pending capture consumes the event: mapping update only, no
        // state toggle, no output emission.
        if let Some((id, slot)) = self.learn.take_pending() {
            let result = match slot {
                LearnSlot::Input => self.registry.set_input_cc(id, cc),
                LearnSlot::Output => self.registry.set_output_cc(id, cc),
            };
            match result {
                Ok(()) => {
                    log::info!("MIDI: learned {:?} CC{} for switch {}", slot, cc, id);
                    self.emit(EngineEvent::MappingLearned { id, slot, cc });
                }
                // The target was deleted while the capture was pending
                Err(e) => log::warn!("MIDI: learn capture dropped: {}", e),
            }
            return Ok(());
        }

        let Some(switch) = self.registry.find_by_input_cc(cc) else {
            log::debug!("MIDI: CC{} is not mapped to any switch", cc);
            self.emit(EngineEvent::UnmappedCc { cc });
            return Ok(());
        };
        let (id, mode, prev_state, output_cc) =
            (switch.id, switch.mode, switch.state, switch.output_cc);

        let new_state = match mode {
            // Only a press flips a toggle; releases re-assert the held state
            SwitchMode::Toggle => {
                if value > 0 {
                    !prev_state
                } else {
                    prev_state
                }
            }
            SwitchMode::Momentary => value > 0,
        };

        self.registry.set_state(id, new_state)?;
        self.emit(EngineEvent::SwitchStateChanged {
            id,
            state: new_state,
            output_cc,
        });

        let out_value = if new_state { MIDI_DATA_MAX } else { 0 };
        match self.output.send_cc(output_cc, out_value) {
            Ok(()) => log::debug!("MIDI OUT: CC{} = {}", output_cc, out_value),
            Err(e) => {
                log::warn!("MIDI: failed to send CC{}: {}", output_cc, e);
                self.emit(EngineEvent::SendFailed {
                    cc: output_cc,
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    // === Front-end operations, serialized through the same lock ===

    /// Add a user switch
    pub fn create_switch(&mut self) -> Result<SwitchId, EngineError> {
        let id = self.registry.create()?;
        log::info!(
            "MIDI: switch {} added ({}/{})",
            id,
            self.registry.len(),
            self.registry.limits().max_switches
        );
        Ok(id)
    }

    /// Delete a user switch; protected switches are refused
    pub fn delete_switch(&mut self, id: SwitchId) -> Result<(), EngineError> {
        self.registry.delete(id)?;
        log::info!("MIDI: switch {} deleted", id);
        Ok(())
    }

    /// Edit the output CC of a switch
    pub fn set_output_cc(&mut self, id: SwitchId, cc: u8) -> Result<(), EngineError> {
        self.registry.set_output_cc(id, cc)
    }

    /// Change the mode of a switch
    pub fn set_mode(&mut self, id: SwitchId, mode: SwitchMode) -> Result<(), EngineError> {
        self.registry.set_mode(id, mode)
    }

    /// Arm an input-CC capture for `id`
    pub fn start_learn_input(&mut self, id: SwitchId) -> Result<(), EngineError> {
        self.registry.get(id)?;
        self.learn.start_input(id);
        log::info!("MIDI: learning input CC for switch {}", id);
        Ok(())
    }

    /// Arm an output-CC capture for `id`
    pub fn start_learn_output(&mut self, id: SwitchId) -> Result<(), EngineError> {
        self.registry.get(id)?;
        self.learn.start_output(id);
        log::info!("MIDI: learning output CC for switch {}", id);
        Ok(())
    }

    /// Drop any pending capture
    pub fn cancel_learn(&mut self) {
        if self.learn.is_active() {
            log::info!("MIDI: learn mode cancelled");
        }
        self.learn.cancel();
    }

    /// Current learning state
    pub fn learn_state(&self) -> LearnState {
        self.learn.state()
    }

    /// Snapshot of all switches, in creation order
    pub fn switches(&self) -> Vec<Switch> {
        self.registry.all().to_vec()
    }

    /// The underlying registry
    pub fn registry(&self) -> &SwitchRegistry {
        &self.registry
    }

    /// Mutable access to the registry (configuration restore)
    pub fn registry_mut(&mut self) -> &mut SwitchRegistry {
        &mut self.registry
    }

    /// Install the output half of a freshly opened transport
    pub fn set_output(&mut self, output: S) {
        self.output = output;
    }

    /// Tear down transport state after a disconnect
    ///
    /// Closes the output half, forces the learning session back to idle (a
    /// pending capture tied to a closed connection is meaningless) and
    /// notifies the front-end.
    pub(crate) fn handle_disconnect(&mut self) {
        self.output.close();
        if self.learn.is_active() {
            log::info!("MIDI: pending learn capture cancelled by disconnect");
        }
        self.learn.cancel();
        self.emit(EngineEvent::Disconnected);
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.try_send(event).is_err() {
            log::warn!("MIDI: event channel full, dropping notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SendError;
    use crate::switch::RegistryLimits;
    use flume::Receiver;

    struct RecordingSender {
        sent: Vec<(u8, u8)>,
    }

    impl RecordingSender {
        fn new() -> Self {
            Self { sent: Vec::new() }
        }
    }

    impl CcSender for RecordingSender {
        fn send_cc(&mut self, control: u8, value: u8) -> Result<(), SendError> {
            if control > MIDI_DATA_MAX {
                return Err(SendError::InvalidRange(control));
            }
            self.sent.push((control, value));
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn engine() -> (Engine<RecordingSender>, Receiver<EngineEvent>) {
        let (tx, rx) = flume::unbounded();
        let registry = SwitchRegistry::with_startup_switches(RegistryLimits::default());
        (Engine::new(registry, RecordingSender::new(), tx), rx)
    }

    fn events_of(rx: &Receiver<EngineEvent>) -> Vec<EngineEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_toggle_flips_on_press_only() {
        let (mut engine, rx) = engine();
        let id = engine.switches()[0].id;
        engine.registry_mut().set_input_cc(id, 20).unwrap();

        engine.on_input_cc(20, 127).unwrap();
        engine.on_input_cc(20, 0).unwrap(); // release: no flip
        engine.on_input_cc(20, 127).unwrap();

        let states: Vec<bool> = events_of(&rx)
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::SwitchStateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![true, true, false]);
        // Emissions mirror the state: ON, re-assert ON on release, OFF
        assert_eq!(engine.output.sent, vec![(10, 127), (10, 127), (10, 0)]);
        assert!(!engine.switches()[0].state);
    }

    #[test]
    fn test_momentary_mirrors_value() {
        let (mut engine, rx) = engine();
        let id = engine.switches()[1].id;
        engine.registry_mut().set_input_cc(id, 21).unwrap();
        engine.set_mode(id, SwitchMode::Momentary).unwrap();

        engine.on_input_cc(21, 127).unwrap();
        assert!(engine.switches()[1].state);
        engine.on_input_cc(21, 0).unwrap();
        assert!(!engine.switches()[1].state);

        assert_eq!(engine.output.sent, vec![(11, 127), (11, 0)]);
        assert!(events_of(&rx)
            .iter()
            .any(|e| matches!(e, EngineEvent::SwitchStateChanged { state: false, .. })));
    }

    #[test]
    fn test_unmapped_cc_is_advisory() {
        let (mut engine, rx) = engine();
        engine.on_input_cc(99, 127).unwrap();

        assert!(engine.output.sent.is_empty());
        assert!(engine.switches().iter().all(|s| !s.state));
        let events = events_of(&rx);
        assert!(events.contains(&EngineEvent::UnmappedCc { cc: 99 }));
        assert!(!events
            .iter()
            .any(|e| matches!(e, EngineEvent::SwitchStateChanged { .. })));
    }

    #[test]
    fn test_learn_input_round_trip() {
        let (mut engine, rx) = engine();
        let id = engine.switches()[2].id;
        engine.start_learn_input(id).unwrap();

        engine.on_input_cc(55, 0).unwrap(); // value is irrelevant for learning

        assert_eq!(engine.learn_state(), LearnState::Idle);
        let switch = engine.registry().get(id).unwrap();
        assert_eq!(switch.input_cc, Some(55));
        assert!(!switch.state);
        assert!(engine.output.sent.is_empty());
        assert!(events_of(&rx).contains(&EngineEvent::MappingLearned {
            id,
            slot: LearnSlot::Input,
            cc: 55,
        }));
    }

    #[test]
    fn test_learn_output_round_trip() {
        let (mut engine, _rx) = engine();
        let id = engine.switches()[0].id;
        engine.start_learn_output(id).unwrap();

        engine.on_input_cc(77, 127).unwrap();

        assert_eq!(engine.registry().get(id).unwrap().output_cc, 77);
        assert_eq!(engine.learn_state(), LearnState::Idle);
        assert!(engine.output.sent.is_empty());
    }

    #[test]
    fn test_learn_for_unknown_switch_refused() {
        let (mut engine, _rx) = engine();
        let bogus = SwitchId::new(999);
        assert_eq!(
            engine.start_learn_input(bogus),
            Err(EngineError::NotFound(bogus))
        );
        assert_eq!(engine.learn_state(), LearnState::Idle);
    }

    #[test]
    fn test_capture_for_deleted_switch_is_dropped() {
        let (mut engine, rx) = engine();
        let id = engine.create_switch().unwrap();
        engine.start_learn_input(id).unwrap();
        engine.delete_switch(id).unwrap();

        engine.on_input_cc(30, 127).unwrap();

        assert_eq!(engine.learn_state(), LearnState::Idle);
        assert!(!events_of(&rx)
            .iter()
            .any(|e| matches!(e, EngineEvent::MappingLearned { .. })));
    }

    #[test]
    fn test_out_of_range_output_cc_is_non_fatal() {
        let (mut engine, rx) = engine();
        let id = engine.switches()[0].id;
        engine.registry_mut().set_input_cc(id, 20).unwrap();
        // Direct edit bypassing the validating setter
        engine.registry_mut().get_mut(id).unwrap().output_cc = 200;

        engine.on_input_cc(20, 127).unwrap();

        assert!(engine.switches()[0].state); // state still toggled
        assert!(engine.output.sent.is_empty());
        assert!(events_of(&rx)
            .iter()
            .any(|e| matches!(e, EngineEvent::SendFailed { cc: 200, .. })));
    }

    #[test]
    fn test_rejects_out_of_range_input() {
        let (mut engine, rx) = engine();
        assert_eq!(
            engine.on_input_cc(128, 0),
            Err(EngineError::InvalidRange(128))
        );
        assert_eq!(
            engine.on_input_cc(0, 200),
            Err(EngineError::InvalidRange(200))
        );
        assert!(events_of(&rx).is_empty());
    }

    #[test]
    fn test_disconnect_cancels_learning() {
        let (mut engine, rx) = engine();
        let id = engine.switches()[0].id;
        engine.start_learn_input(id).unwrap();

        engine.handle_disconnect();

        assert_eq!(engine.learn_state(), LearnState::Idle);
        assert!(events_of(&rx).contains(&EngineEvent::Disconnected));
    }
}
