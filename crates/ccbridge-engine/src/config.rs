//! Persisted bridge configuration
//!
//! JSON on disk: one record per switch plus port and language preferences.
//! Loading is tolerant: a missing file, a parse failure or absent optional
//! fields all fall back to defaults instead of failing the session.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::switch::{RegistryLimits, SwitchId, SwitchMode, SwitchRegistry, MIDI_DATA_MAX};

/// Root bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// UI language tag, carried opaquely for the presentation layer
    pub language: String,
    /// Display name of the last-used input port
    pub input_port: Option<String>,
    /// Display name of the last-used output port
    pub output_port: Option<String>,
    /// One record per switch, in display order
    pub switches: Vec<SwitchConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            input_port: None,
            output_port: None,
            switches: Vec::new(),
        }
    }
}

/// Persisted state of a single switch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchConfig {
    /// Registry id
    pub id: u32,

    /// Input CC; stored as the string `"unassigned"` when not yet learned
    #[serde(default, with = "input_cc_field")]
    pub input_cc: Option<u8>,

    /// Output CC; absent falls back to the creation-order default
    #[serde(default)]
    pub output_cc: Option<u8>,

    /// Toggle or momentary
    #[serde(default)]
    pub mode: SwitchMode,

    /// Last logical state
    #[serde(default)]
    pub state: bool,
}

/// `input_cc` is a CC number or the literal string `"unassigned"` on disk.
/// Older files stored numbers as strings, so those parse too.
mod input_cc_field {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(cc) => serializer.serialize_u8(*cc),
            None => serializer.serialize_str("unassigned"),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u8),
            Text(String),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Number(cc)) => Some(cc),
            Some(Raw::Text(text)) => text.trim().parse::<u8>().ok(),
            None => None,
        })
    }
}

/// Get the default config file path
///
/// Returns: `<config dir>/ccbridge/bridge.json`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ccbridge")
        .join("bridge.json")
}

/// Load the bridge configuration from a JSON file
///
/// A missing file is normal (first run) and yields the default config; an
/// unreadable or invalid file logs a warning and does the same.
pub fn load_config(path: &Path) -> BridgeConfig {
    if !path.exists() {
        log::info!("load_config: {:?} doesn't exist, using defaults", path);
        return BridgeConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<BridgeConfig>(&contents) {
            Ok(config) => {
                log::info!(
                    "load_config: loaded {} switch(es) from {:?}",
                    config.switches.len(),
                    path
                );
                config
            }
            Err(e) => {
                log::warn!("load_config: failed to parse {:?}: {}", path, e);
                BridgeConfig::default()
            }
        },
        Err(e) => {
            log::warn!("load_config: failed to read {:?}: {}", path, e);
            BridgeConfig::default()
        }
    }
}

/// Save the bridge configuration to a JSON file
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &BridgeConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory: {:?}", parent))?;
    }

    let json =
        serde_json::to_string_pretty(config).context("failed to serialize bridge config")?;
    std::fs::write(path, json).with_context(|| format!("failed to write config file: {:?}", path))?;

    log::info!("save_config: saved to {:?}", path);
    Ok(())
}

/// Rebuild a registry from a persisted configuration
///
/// Records beyond `limits.max_switches` are dropped with a warning. The
/// startup switches (ids below `limits.protected_switches`) stay protected;
/// if the file holds fewer records than that, the missing ones are recreated
/// with defaults so the protected set is always complete.
pub fn registry_from_config(config: &BridgeConfig, limits: RegistryLimits) -> SwitchRegistry {
    let mut registry = SwitchRegistry::new(limits);

    if config.switches.len() > limits.max_switches {
        log::warn!(
            "registry_from_config: {} switch records, keeping first {}",
            config.switches.len(),
            limits.max_switches
        );
    }

    for record in config.switches.iter().take(limits.max_switches) {
        let id = SwitchId::new(record.id);
        let protected = (record.id as usize) < limits.protected_switches;
        // Capacity can't overflow: the take() above bounds the count
        let Ok(id) = registry.create_with_id(id, protected) else {
            break;
        };
        if let Ok(switch) = registry.get_mut(id) {
            // Raw field writes: a hand-edited file may carry an out-of-range
            // output CC, which the dispatcher reports at emission time
            switch.input_cc = record.input_cc.filter(|cc| *cc <= MIDI_DATA_MAX);
            if let Some(output_cc) = record.output_cc {
                switch.output_cc = output_cc;
            }
            switch.mode = record.mode;
            switch.state = record.state;
        }
    }

    let mut next_raw = 0u32;
    while registry.len() < limits.protected_switches.min(limits.max_switches) {
        while registry.get(SwitchId::new(next_raw)).is_ok() {
            next_raw += 1;
        }
        if registry.create_with_id(SwitchId::new(next_raw), true).is_err() {
            break;
        }
    }

    registry
}

/// Snapshot a registry back into the persisted shape
pub fn config_from_registry(registry: &SwitchRegistry, base: &BridgeConfig) -> BridgeConfig {
    BridgeConfig {
        language: base.language.clone(),
        input_port: base.input_port.clone(),
        output_port: base.output_port.clone(),
        switches: registry
            .all()
            .iter()
            .map(|s| SwitchConfig {
                id: s.id.raw(),
                input_cc: s.input_cc,
                output_cc: Some(s.output_cc),
                mode: s.mode,
                state: s.state,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unassigned_input_cc_round_trip() {
        let config = BridgeConfig {
            switches: vec![
                SwitchConfig {
                    id: 0,
                    input_cc: None,
                    output_cc: Some(10),
                    mode: SwitchMode::Toggle,
                    state: false,
                },
                SwitchConfig {
                    id: 1,
                    input_cc: Some(20),
                    output_cc: Some(11),
                    mode: SwitchMode::Momentary,
                    state: true,
                },
            ],
            ..BridgeConfig::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"unassigned\""));

        let parsed: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.switches[0].input_cc, None);
        assert_eq!(parsed.switches[1].input_cc, Some(20));
        assert_eq!(parsed.switches[1].mode, SwitchMode::Momentary);
    }

    #[test]
    fn test_legacy_stringly_fields_tolerated() {
        let json = r#"{
            "language": "es",
            "switches": [
                { "id": 0, "input_cc": "34", "output_cc": 10 },
                { "id": 1, "input_cc": "unassigned" }
            ]
        }"#;
        let config: BridgeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.language, "es");
        assert_eq!(config.switches[0].input_cc, Some(34));
        assert_eq!(config.switches[1].input_cc, None);
        assert_eq!(config.switches[1].output_cc, None);
        assert_eq!(config.switches[1].mode, SwitchMode::Toggle);
        assert!(!config.switches[1].state);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config: BridgeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.language, "en");
        assert_eq!(config.input_port, None);
        assert!(config.switches.is_empty());
    }

    #[test]
    fn test_registry_from_config_marks_protected_and_tops_up() {
        let config = BridgeConfig {
            switches: vec![SwitchConfig {
                id: 0,
                input_cc: Some(20),
                output_cc: Some(40),
                mode: SwitchMode::Momentary,
                state: true,
            }],
            ..BridgeConfig::default()
        };

        let registry = registry_from_config(&config, RegistryLimits::default());
        assert_eq!(registry.len(), 4); // topped up to the protected minimum
        assert!(registry.all().iter().all(|s| s.protected));

        let loaded = registry.get(SwitchId::new(0)).unwrap();
        assert_eq!(loaded.input_cc, Some(20));
        assert_eq!(loaded.output_cc, 40);
        assert_eq!(loaded.mode, SwitchMode::Momentary);
        assert!(loaded.state);
    }

    #[test]
    fn test_registry_from_config_preserves_missing_output_default() {
        let config = BridgeConfig {
            switches: vec![SwitchConfig {
                id: 5,
                input_cc: None,
                output_cc: None,
                mode: SwitchMode::Toggle,
                state: false,
            }],
            ..BridgeConfig::default()
        };

        let registry = registry_from_config(&config, RegistryLimits::default());
        let loaded = registry.get(SwitchId::new(5)).unwrap();
        assert_eq!(loaded.output_cc, 15); // 10 + id
        assert!(!loaded.protected); // id beyond the protected range
    }

    #[test]
    fn test_registry_snapshot_round_trip() {
        let mut registry = SwitchRegistry::default();
        let id = registry.create().unwrap();
        registry.set_input_cc(id, 33).unwrap();
        registry.set_mode(id, SwitchMode::Momentary).unwrap();

        let base = BridgeConfig {
            language: "es".to_string(),
            input_port: Some("FootCtrl".to_string()),
            ..BridgeConfig::default()
        };
        let snapshot = config_from_registry(&registry, &base);
        assert_eq!(snapshot.language, "es");
        assert_eq!(snapshot.switches.len(), 5);

        let restored = registry_from_config(&snapshot, RegistryLimits::default());
        assert_eq!(restored.len(), 5);
        assert_eq!(restored.get(id).unwrap().input_cc, Some(33));
        assert_eq!(restored.get(id).unwrap().mode, SwitchMode::Momentary);
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join(format!("ccbridge-nonexistent-{}.json", std::process::id()));
        let config = load_config(&path);
        assert_eq!(config.language, "en");
        assert!(config.switches.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!("ccbridge-test-{}.json", std::process::id()));
        let mut config = BridgeConfig::default();
        config.output_port = Some("mwave_midi".to_string());
        config.switches.push(SwitchConfig {
            id: 0,
            input_cc: Some(4),
            output_cc: Some(20),
            mode: SwitchMode::Toggle,
            state: true,
        });

        save_config(&config, &path).unwrap();
        let loaded = load_config(&path);
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.output_port.as_deref(), Some("mwave_midi"));
        assert_eq!(loaded.switches[0].input_cc, Some(4));
        assert!(loaded.switches[0].state);
    }
}
