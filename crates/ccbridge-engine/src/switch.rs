//! Logical switch model and registry
//!
//! A switch binds an incoming (learned) CC number to a configurable output CC
//! and a latched or momentary state. The registry keeps switches in creation
//! order; that order drives display numbering, default output CC derivation
//! and the input-CC resolution tie-break.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Maximum value of a 7-bit MIDI data byte (CC number or CC value)
pub const MIDI_DATA_MAX: u8 = 127;

/// Output CC numbers start here; switch N defaults to `OUTPUT_CC_BASE + N`
pub const OUTPUT_CC_BASE: u8 = 10;

/// Stable identifier for a logical switch
///
/// Allocated monotonically by the registry and never reused within a session,
/// even after deletions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwitchId(u32);

impl SwitchId {
    /// Wrap a raw id (used when restoring a persisted configuration)
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw numeric id
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SwitchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How an incoming CC press drives the switch state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchMode {
    /// Each press (value > 0) flips the latched state
    #[default]
    Toggle,
    /// State mirrors the instantaneous pressed/released value
    Momentary,
}

/// A logical switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch {
    /// Registry-assigned identifier
    pub id: SwitchId,
    /// Physical CC number driving this switch; unset until learned
    pub input_cc: Option<u8>,
    /// CC number emitted towards the destination when the state changes
    pub output_cc: u8,
    /// Toggle or momentary behavior
    pub mode: SwitchMode,
    /// Current logical ON/OFF state
    pub state: bool,
    /// Startup switches cannot be deleted
    pub protected: bool,
}

/// Registry sizing limits
#[derive(Debug, Clone, Copy)]
pub struct RegistryLimits {
    /// Maximum number of switches the registry will hold
    pub max_switches: usize,
    /// Number of protected switches created at startup
    pub protected_switches: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_switches: 10,
            protected_switches: 4,
        }
    }
}

/// Ordered store of logical switches
#[derive(Debug)]
pub struct SwitchRegistry {
    switches: Vec<Switch>,
    next_id: u32,
    limits: RegistryLimits,
}

impl SwitchRegistry {
    /// Create an empty registry
    pub fn new(limits: RegistryLimits) -> Self {
        Self {
            switches: Vec::new(),
            next_id: 0,
            limits,
        }
    }

    /// Create a registry pre-populated with the protected startup switches
    pub fn with_startup_switches(limits: RegistryLimits) -> Self {
        let mut registry = Self::new(limits);
        for _ in 0..limits.protected_switches.min(limits.max_switches) {
            let id = SwitchId(registry.next_id);
            // Capacity was checked by the min() above
            let _ = registry.insert(id, true);
        }
        registry
    }

    /// The configured limits
    pub fn limits(&self) -> RegistryLimits {
        self.limits
    }

    /// Allocate a new user switch with default settings
    pub fn create(&mut self) -> Result<SwitchId, EngineError> {
        let id = SwitchId(self.next_id);
        self.insert(id, false)
    }

    /// Insert a switch with a caller-chosen id (configuration restore)
    ///
    /// Advances the internal id counter past `id` so later `create` calls keep
    /// allocating fresh ids. Callers are responsible for id uniqueness; a
    /// duplicate would be shadowed on lookup, never merged.
    pub fn create_with_id(&mut self, id: SwitchId, protected: bool) -> Result<SwitchId, EngineError> {
        self.insert(id, protected)
    }

    fn insert(&mut self, id: SwitchId, protected: bool) -> Result<SwitchId, EngineError> {
        if self.switches.len() >= self.limits.max_switches {
            return Err(EngineError::CapacityExceeded(self.limits.max_switches));
        }
        self.switches.push(Switch {
            id,
            input_cc: None,
            output_cc: default_output_cc(id),
            mode: SwitchMode::Toggle,
            state: false,
            protected,
        });
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        Ok(id)
    }

    /// Remove a switch; protected switches are refused
    pub fn delete(&mut self, id: SwitchId) -> Result<(), EngineError> {
        let index = self
            .switches
            .iter()
            .position(|s| s.id == id)
            .ok_or(EngineError::NotFound(id))?;
        if self.switches[index].protected {
            return Err(EngineError::Protected(id));
        }
        self.switches.remove(index);
        Ok(())
    }

    /// Look up a switch by id
    pub fn get(&self, id: SwitchId) -> Result<&Switch, EngineError> {
        self.switches
            .iter()
            .find(|s| s.id == id)
            .ok_or(EngineError::NotFound(id))
    }

    /// Direct mutable access to a switch
    ///
    /// Bypasses CC range validation; the validating paths are `set_input_cc`
    /// and `set_output_cc`.
    pub fn get_mut(&mut self, id: SwitchId) -> Result<&mut Switch, EngineError> {
        self.switches
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(EngineError::NotFound(id))
    }

    /// All switches, in creation order
    pub fn all(&self) -> &[Switch] {
        &self.switches
    }

    /// Number of switches currently held
    pub fn len(&self) -> usize {
        self.switches.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }

    /// Assign the input CC mapping of a switch
    pub fn set_input_cc(&mut self, id: SwitchId, cc: u8) -> Result<(), EngineError> {
        check_range(cc)?;
        self.get_mut(id)?.input_cc = Some(cc);
        Ok(())
    }

    /// Assign the output CC of a switch
    pub fn set_output_cc(&mut self, id: SwitchId, cc: u8) -> Result<(), EngineError> {
        check_range(cc)?;
        self.get_mut(id)?.output_cc = cc;
        Ok(())
    }

    /// Change the mode of a switch
    pub fn set_mode(&mut self, id: SwitchId, mode: SwitchMode) -> Result<(), EngineError> {
        self.get_mut(id)?.mode = mode;
        Ok(())
    }

    /// Set the logical state of a switch
    pub fn set_state(&mut self, id: SwitchId, state: bool) -> Result<(), EngineError> {
        self.get_mut(id)?.state = state;
        Ok(())
    }

    /// Resolve the switch bound to an incoming CC number
    ///
    /// Linear scan in creation order; with duplicate assignments the
    /// first-created switch wins and later ones are shadowed.
    pub fn find_by_input_cc(&self, cc: u8) -> Option<&Switch> {
        self.switches.iter().find(|s| s.input_cc == Some(cc))
    }
}

impl Default for SwitchRegistry {
    fn default() -> Self {
        Self::with_startup_switches(RegistryLimits::default())
    }
}

/// Default output CC for a newly created switch
fn default_output_cc(id: SwitchId) -> u8 {
    let cc = u32::from(OUTPUT_CC_BASE).saturating_add(id.0);
    cc.min(u32::from(MIDI_DATA_MAX)) as u8
}

fn check_range(cc: u8) -> Result<(), EngineError> {
    if cc > MIDI_DATA_MAX {
        return Err(EngineError::InvalidRange(cc));
    }
    Ok(())
}
