//! Station configuration (C9): TOML-plus-`serde`, validated once at
//! startup rather than at first use, the way the teacher's
//! `ServerConfig`/`SystemConfig` types are loaded and checked before any
//! request is served.

use crate::model::PileType;
use crate::tariff::TariffSchedule;
use ev_shared::DispatchPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PileConfig {
    pub pile_id: String,
    pub pile_type: PileType,
    pub power_kw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub piles: Vec<PileConfig>,
    pub waiting_area_capacity: usize,
    pub heartbeat_timeout_secs: u64,
    pub dispatch_tick_secs: u64,
    pub dispatch_policy: DispatchPolicy,
    pub tariff: TariffSchedule,
    pub command_timeout_secs: u64,
    pub command_retry_attempts: u32,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            piles: vec![
                PileConfig {
                    pile_id: "A".to_owned(),
                    pile_type: PileType::Fast,
                    power_kw: 30.0,
                },
                PileConfig {
                    pile_id: "B".to_owned(),
                    pile_type: PileType::Fast,
                    power_kw: 30.0,
                },
                PileConfig {
                    pile_id: "C".to_owned(),
                    pile_type: PileType::Trickle,
                    power_kw: 7.0,
                },
                PileConfig {
                    pile_id: "D".to_owned(),
                    pile_type: PileType::Trickle,
                    power_kw: 7.0,
                },
                PileConfig {
                    pile_id: "E".to_owned(),
                    pile_type: PileType::Trickle,
                    power_kw: 7.0,
                },
            ],
            waiting_area_capacity: 6,
            heartbeat_timeout_secs: 30,
            dispatch_tick_secs: 5,
            dispatch_policy: DispatchPolicy::Priority,
            tariff: TariffSchedule::default(),
            command_timeout_secs: 10,
            command_retry_attempts: 3,
        }
    }
}

/// Mirrors the teacher's `ValidationResult`/`ValidationIssue` accumulator:
/// a config load collects every problem instead of failing on the first
/// one, so an operator fixing a TOML file sees the whole list at once.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

impl StationConfig {
    /// Loads from a TOML file, falling back to [`Default`] if `path` does
    /// not exist, mirroring how the scenario-1 layout doubles as the
    /// out-of-the-box default.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
        let config: StationConfig = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))?;
        Ok(config)
    }

    #[must_use]
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.piles.is_empty() {
            result.push("at least one pile must be configured");
        }
        let mut seen = HashSet::new();
        for pile in &self.piles {
            if !seen.insert(pile.pile_id.clone()) {
                result.push(format!("duplicate pile_id: {}", pile.pile_id));
            }
            if pile.power_kw <= 0.0 {
                result.push(format!("pile {} has non-positive power_kw", pile.pile_id));
            }
        }
        if self.waiting_area_capacity == 0 {
            result.push("waiting_area_capacity must be greater than zero");
        }
        if self.heartbeat_timeout_secs == 0 {
            result.push("heartbeat_timeout_secs must be greater than zero");
        }
        if self.dispatch_tick_secs == 0 {
            result.push("dispatch_tick_secs must be greater than zero");
        }
        if let Err(e) = self.tariff.validate() {
            result.push(format!("tariff schedule invalid: {e}"));
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(StationConfig::default().validate().is_valid());
    }

    #[test]
    fn duplicate_pile_id_is_rejected() {
        let mut config = StationConfig::default();
        config.piles.push(PileConfig {
            pile_id: "A".to_owned(),
            pile_type: PileType::Fast,
            power_kw: 30.0,
        });
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("duplicate")));
    }

    #[test]
    fn missing_config_file_falls_back_to_default() {
        let config = StationConfig::load_from_file(Path::new("/nonexistent/station.toml")).unwrap();
        assert_eq!(config, StationConfig::default());
    }
}
