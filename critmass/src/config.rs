//! Run configuration: the shared [`ModelConfig`] contract, named-option
//! overrides, and loading options from TOML / JSON files.
//!
//! Each model variant has an explicit config struct (see `agents::*`) that
//! rejects unknown keys. Overrides are applied by round-tripping the struct
//! through `serde_json`, so an override is accepted exactly when the struct
//! would accept it from a file.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agents::Agent;
use crate::error::{ConfigError, SimError, ValidationError};

/// Option name that carries the run length in config files.
pub const STEPS_KEY: &str = "n_steps";

// === MODEL CONFIG ===

pub trait ModelConfig:
    Serialize + DeserializeOwned + Default + Clone + Debug + Send + Sync + 'static
{
    type Agent: Agent<Config = Self>;

    /// Model name used in logs and error messages.
    const MODEL: &'static str;

    fn validate(&self) -> Result<(), ValidationError>;

    fn seed(&self) -> u64;

    fn set_seed(&mut self, seed: u64);

    fn population_size(&self) -> usize;

    /// Whether the collector keeps one agent-level row per agent per step.
    fn record_agents(&self) -> bool;

    /// Accepted alternative spellings of option names.
    fn canonical_key(key: &str) -> &str {
        key
    }

    /// Copy of `self` with `overrides` applied. Unknown keys and values the
    /// struct cannot hold are rejected, naming the offending option.
    fn with_overrides(&self, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut fields = self.to_params();

        for (key, value) in overrides.iter() {
            let canonical = Self::canonical_key(key);
            if !fields.contains_key(canonical) {
                return Err(ConfigError::UnknownKey {
                    key: key.clone(),
                    model: Self::MODEL,
                });
            }
            fields.insert(canonical.to_string(), value.clone());
            serde_json::from_value::<Self>(Value::Object(fields.clone())).map_err(|e| {
                ConfigError::InvalidValue {
                    key: key.clone(),
                    value: value.to_string(),
                    reason: e.to_string(),
                }
            })?;
        }

        serde_json::from_value(Value::Object(fields))
            .map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Defaults with `overrides` applied, validated.
    fn from_overrides(overrides: &Overrides) -> Result<Self, SimError> {
        let config = Self::default().with_overrides(overrides)?;
        config.validate()?;
        Ok(config)
    }

    /// Every option as a flat name -> value map.
    fn to_params(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

// === OVERRIDES ===

/// Named option values, as read from a file or supplied at call time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Overrides(BTreeMap<String, Value>);

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Later values win.
    pub fn merged(&self, other: &Overrides) -> Overrides {
        let mut merged = self.clone();
        for (key, value) in other.iter() {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Split off the run length option, if present.
    pub fn take_steps(&mut self) -> Result<Option<usize>, ConfigError> {
        let Some(value) = self.0.remove(STEPS_KEY) else {
            return Ok(None);
        };
        value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: STEPS_KEY.to_string(),
                value: value.to_string(),
                reason: "expected a non-negative integer".to_string(),
            })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Read options from a `.toml` or `.json` file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let parse: fn(&str) -> Result<Self, ConfigError> = match extension.as_deref() {
            Some("toml") => Self::from_toml_str,
            Some("json") => Self::from_json_str,
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    path: path.to_path_buf(),
                });
            }
        };
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loading configuration");
        parse(&text)
    }
}

impl FromIterator<(String, Value)> for Overrides {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Load a config file into a validated config plus the optional run length.
pub fn load_config<C: ModelConfig>(path: &Path) -> Result<(C, Option<usize>), SimError> {
    let mut overrides = Overrides::load(path)?;
    let steps = overrides.take_steps()?;
    let config = C::from_overrides(&overrides)?;
    Ok((config, steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{CooperationConfig, CorruptionConfig, OversightStructure, PolycentricConfig};

    #[test]
    fn test_overrides_apply_to_named_fields() {
        let overrides = Overrides::new()
            .with("n_agents", 50)
            .with("cooperation_cost", 2)
            .with("network_effects", false);
        let config = CooperationConfig::from_overrides(&overrides).unwrap();
        assert_eq!(config.n_agents, 50);
        assert_eq!(config.cooperation_cost, 2.0);
        assert!(!config.network_effects);
        assert_eq!(config.benefit_multiplier, CooperationConfig::default().benefit_multiplier);
    }

    #[test]
    fn test_unknown_key_is_rejected_with_its_name() {
        let overrides = Overrides::new().with("cooperation_kost", 1.0);
        let err = CooperationConfig::default().with_overrides(&overrides).unwrap_err();
        match err {
            ConfigError::UnknownKey { key, model } => {
                assert_eq!(key, "cooperation_kost");
                assert_eq!(model, "cooperation");
            }
            other => panic!("expected UnknownKey, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_oversight_structure_is_a_config_error() {
        let overrides = Overrides::new().with("oversight_structure", "pyramid");
        let err = CorruptionConfig::default().with_overrides(&overrides).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value, .. } => {
                assert_eq!(key, "oversight_structure");
                assert_eq!(value, "\"pyramid\"");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }

        let ok = Overrides::new().with("oversight_structure", "flat");
        let config = CorruptionConfig::default().with_overrides(&ok).unwrap();
        assert_eq!(config.oversight_structure, OversightStructure::Flat);
    }

    #[test]
    fn test_wrongly_typed_value_names_the_option() {
        let overrides = Overrides::new().with("n_groups", "five");
        let err = PolycentricConfig::default().with_overrides(&overrides).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "n_groups"));
    }

    #[test]
    fn test_alias_maps_to_canonical_option() {
        let overrides = Overrides::new().with("ostrom_monitoring", false);
        let config = PolycentricConfig::from_overrides(&overrides).unwrap();
        assert!(!config.peer_monitoring);
    }

    #[test]
    fn test_take_steps_splits_run_length() {
        let mut overrides = Overrides::new().with("n_steps", 250).with("seed", 3);
        assert_eq!(overrides.take_steps().unwrap(), Some(250));
        assert!(overrides.get("n_steps").is_none());
        assert_eq!(overrides.take_steps().unwrap(), None);

        let mut bad = Overrides::new().with("n_steps", -1);
        assert!(bad.take_steps().is_err());
    }

    #[test]
    fn test_load_toml_and_json_files() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("corruption.toml");
        fs::write(
            &toml_path,
            "n_enforcers = 40\noversight_structure = \"none\"\nn_steps = 30\n",
        )
        .unwrap();
        let (config, steps) = load_config::<CorruptionConfig>(&toml_path).unwrap();
        assert_eq!(config.n_enforcers, 40);
        assert_eq!(config.oversight_structure, OversightStructure::None);
        assert_eq!(steps, Some(30));

        let json_path = dir.path().join("coop.json");
        fs::write(&json_path, r#"{"n_agents": 10, "decision_noise": 0.0}"#).unwrap();
        let (config, steps) = load_config::<CooperationConfig>(&json_path).unwrap();
        assert_eq!(config.n_agents, 10);
        assert_eq!(config.decision_noise, 0.0);
        assert_eq!(steps, None);

        let yaml_path = dir.path().join("coop.yaml");
        fs::write(&yaml_path, "n_agents: 10\n").unwrap();
        assert!(matches!(
            Overrides::load(&yaml_path),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let overrides = Overrides::new().with("n_agents", 0);
        let err = CooperationConfig::from_overrides(&overrides).unwrap_err();
        assert!(matches!(
            err,
            SimError::Validation(ValidationError::NonPositive { param: "n_agents", .. })
        ));
    }
}
