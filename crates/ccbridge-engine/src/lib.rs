//! CC remapping engine for bridging a MIDI footswitch controller to a DAW
//!
//! This crate provides:
//! - A logical switch registry with toggle/momentary modes
//! - Interactive CC learning (input and output assignment)
//! - CC remapping dispatch from controller to destination
//! - MIDI port discovery and connection via midir
//! - An event channel bridge for front-end subscriptions
//!
//! # Architecture
//!
//! ```text
//! MIDI controller → midir callback → Engine::on_input_cc → output port
//!                                         │
//!                                         └─ flume channel → front-end
//! ```
//!
//! The midir callback and every front-end mutation lock the same
//! [`Engine`], so a reader never observes a half-updated switch and a learn
//! capture can't race a registry edit.

mod config;
mod connection;
mod engine;
mod error;
mod events;
mod learn;
mod output;
mod switch;

pub use config::{
    config_from_registry, default_config_path, load_config, registry_from_config, save_config,
    BridgeConfig, SwitchConfig,
};
pub use connection::{list_input_ports, list_output_ports, BridgeConnection, PortError};
pub use engine::Engine;
pub use error::EngineError;
pub use events::EngineEvent;
pub use learn::{LearnSession, LearnSlot, LearnState};
pub use output::{CcSender, PortSender, SendError};
pub use switch::{
    RegistryLimits, Switch, SwitchId, SwitchMode, SwitchRegistry, MIDI_DATA_MAX, OUTPUT_CC_BASE,
};

use std::sync::{Arc, Mutex, PoisonError};

use flume::Receiver;

/// Engine shared between the MIDI delivery thread and front-end calls
pub type SharedEngine = Arc<Mutex<Engine<PortSender>>>;

/// Main bridge session manager
///
/// Owns the shared engine, the live port connection (if any) and the event
/// receiver. Front-ends poll events with [`try_recv`](Self::try_recv) or
/// [`drain`](Self::drain), or clone the receiver via
/// [`events`](Self::events) for a dedicated consumer thread.
pub struct BridgeSession {
    engine: SharedEngine,
    event_rx: Receiver<EngineEvent>,
    connection: Option<BridgeConnection>,
    config: BridgeConfig,
}

impl BridgeSession {
    /// Create a session with the default startup switches
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default(), RegistryLimits::default())
    }

    /// Create a session from a loaded configuration
    pub fn with_config(config: BridgeConfig, limits: RegistryLimits) -> Self {
        let registry = if config.switches.is_empty() {
            SwitchRegistry::with_startup_switches(limits)
        } else {
            registry_from_config(&config, limits)
        };

        let (event_tx, event_rx) = flume::bounded(256);
        let engine = Arc::new(Mutex::new(Engine::new(
            registry,
            PortSender::disconnected(),
            event_tx,
        )));

        Self {
            engine,
            event_rx,
            connection: None,
            config,
        }
    }

    fn with_engine<T>(&self, f: impl FnOnce(&mut Engine<PortSender>) -> T) -> T {
        // A poisoned lock means a panicking front-end thread; the engine
        // state itself is still coherent, so keep serving
        let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut engine)
    }

    // === Transport ===

    /// Open the given ports and start bridging
    ///
    /// An existing connection is torn down first. Port names are matched
    /// exactly, then as case-insensitive substrings.
    pub fn connect(&mut self, input_name: &str, output_name: &str) -> Result<(), PortError> {
        if self.connection.is_some() {
            self.disconnect();
        }
        let connection = BridgeConnection::open(input_name, output_name, self.engine.clone())?;
        self.config.input_port = Some(connection.input_port_name().to_string());
        self.config.output_port = Some(connection.output_port_name().to_string());
        self.connection = Some(connection);
        Ok(())
    }

    /// Stop bridging and release both ports
    ///
    /// Also cancels any pending learn capture; a capture tied to a closed
    /// connection is meaningless.
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
    }

    /// Whether a transport session is open
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    // === Events ===

    /// Try to receive a pending engine event (non-blocking)
    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Drain all pending engine events
    pub fn drain(&self) -> impl Iterator<Item = EngineEvent> + '_ {
        std::iter::from_fn(|| self.try_recv())
    }

    /// Clone the event receiver for a dedicated consumer
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.event_rx.clone()
    }

    // === Switch operations ===

    /// Snapshot of all switches, in creation order
    pub fn switches(&self) -> Vec<Switch> {
        self.with_engine(|engine| engine.switches())
    }

    /// Add a user switch
    pub fn create_switch(&self) -> Result<SwitchId, EngineError> {
        self.with_engine(|engine| engine.create_switch())
    }

    /// Delete a user switch
    pub fn delete_switch(&self, id: SwitchId) -> Result<(), EngineError> {
        self.with_engine(|engine| engine.delete_switch(id))
    }

    /// Edit the output CC of a switch
    pub fn set_output_cc(&self, id: SwitchId, cc: u8) -> Result<(), EngineError> {
        self.with_engine(|engine| engine.set_output_cc(id, cc))
    }

    /// Change the mode of a switch
    pub fn set_mode(&self, id: SwitchId, mode: SwitchMode) -> Result<(), EngineError> {
        self.with_engine(|engine| engine.set_mode(id, mode))
    }

    // === Learning ===

    /// Arm an input-CC capture for `id`
    ///
    /// Ignored with a warning when no connection is open; there is nothing
    /// to capture from.
    pub fn start_learn_input(&self, id: SwitchId) -> Result<(), EngineError> {
        if !self.is_connected() {
            log::warn!("MIDI: connect the ports before learning");
            return Ok(());
        }
        self.with_engine(|engine| engine.start_learn_input(id))
    }

    /// Arm an output-CC capture for `id`
    pub fn start_learn_output(&self, id: SwitchId) -> Result<(), EngineError> {
        if !self.is_connected() {
            log::warn!("MIDI: connect the ports before learning");
            return Ok(());
        }
        self.with_engine(|engine| engine.start_learn_output(id))
    }

    /// Drop any pending capture
    pub fn cancel_learn(&self) {
        self.with_engine(|engine| engine.cancel_learn());
    }

    /// Current learning state
    pub fn learn_state(&self) -> LearnState {
        self.with_engine(|engine| engine.learn_state())
    }

    // === Configuration ===

    /// The configuration this session was built from (ports updated on
    /// connect)
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Snapshot the live registry into the persisted shape
    pub fn snapshot_config(&self) -> BridgeConfig {
        self.with_engine(|engine| config_from_registry(engine.registry(), &self.config))
    }
}

impl Default for BridgeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}
