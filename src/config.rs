use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

fn default_update_interval_s() -> u64 { 5 }
fn default_cache_ttl_s() -> u64 { 300 }
fn default_timeout_ms() -> u64 { 5000 }
fn default_base_url() -> String { OPEN_METEO_URL.to_string() }
fn default_inverter_count() -> usize { 4 }
fn default_transformer_count() -> usize { 1 }
fn default_panel_count() -> usize { 100 }
fn default_enable_faults() -> bool { true }
fn default_fault_probability() -> f64 { 0.01 }
fn default_soiling_loss() -> f64 { 0.02 }
fn default_mismatch_loss() -> f64 { 0.02 }
fn default_max_panel_faults() -> usize { 5 }

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default = "default_update_interval_s")]
    pub update_interval_s: u64,
    pub plants: Vec<PlantConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeatherConfig {
    #[serde(default)]
    pub offline_mode: bool,
    #[serde(default = "default_cache_ttl_s")]
    pub cache_ttl_s: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            offline_mode: false,
            cache_ttl_s: default_cache_ttl_s(),
            timeout_ms: default_timeout_ms(),
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, ToSchema)]
pub struct PlantConfig {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub simulation: SimulationConfig,
}

/// Description of one plant, owned by its simulator.
#[derive(Debug, Deserialize, Serialize, Clone, ToSchema, PartialEq)]
pub struct SimulationConfig {
    #[serde(default)]
    pub design_id: String,
    pub capacity_kwp: f64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_inverter_count")]
    pub inverter_count: usize,
    #[serde(default = "default_transformer_count")]
    pub transformer_count: usize,
    #[serde(default = "default_panel_count")]
    pub panel_count: usize,
    #[serde(default = "default_enable_faults")]
    pub enable_random_faults: bool,
    #[serde(default = "default_fault_probability")]
    pub fault_probability_per_cycle: f64,
    #[serde(default = "default_soiling_loss")]
    pub soiling_loss: f64,
    #[serde(default = "default_mismatch_loss")]
    pub mismatch_loss: f64,
    #[serde(default = "default_max_panel_faults")]
    pub max_concurrent_panel_faults: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SimulationConfig {
    pub fn new(design_id: &str, capacity_kwp: f64, latitude: f64, longitude: f64) -> Self {
        Self {
            design_id: design_id.to_string(),
            capacity_kwp,
            latitude,
            longitude,
            inverter_count: default_inverter_count(),
            transformer_count: default_transformer_count(),
            panel_count: default_panel_count(),
            enable_random_faults: default_enable_faults(),
            fault_probability_per_cycle: default_fault_probability(),
            soiling_loss: default_soiling_loss(),
            mismatch_loss: default_mismatch_loss(),
            max_concurrent_panel_faults: default_max_panel_faults(),
            seed: None,
        }
    }

    pub fn system_loss_fraction(&self) -> f64 {
        self.soiling_loss + self.mismatch_loss
    }

    /// Merge the fields present in `patch`; everything else is left alone.
    pub fn apply(&mut self, patch: &SimulationConfigPatch) {
        if let Some(v) = &patch.design_id { self.design_id = v.clone(); }
        if let Some(v) = patch.capacity_kwp { self.capacity_kwp = v; }
        if let Some(v) = patch.latitude { self.latitude = v; }
        if let Some(v) = patch.longitude { self.longitude = v; }
        if let Some(v) = patch.inverter_count { self.inverter_count = v; }
        if let Some(v) = patch.transformer_count { self.transformer_count = v; }
        if let Some(v) = patch.panel_count { self.panel_count = v; }
        if let Some(v) = patch.enable_random_faults { self.enable_random_faults = v; }
        if let Some(v) = patch.fault_probability_per_cycle { self.fault_probability_per_cycle = v; }
        if let Some(v) = patch.soiling_loss { self.soiling_loss = v; }
        if let Some(v) = patch.mismatch_loss { self.mismatch_loss = v; }
        if let Some(v) = patch.max_concurrent_panel_faults { self.max_concurrent_panel_faults = v; }
    }

    /// Copy of `self` with `patch` merged in, or the reason it would be invalid.
    pub fn patched(&self, patch: &SimulationConfigPatch) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        next.apply(patch);
        next.validate(&next.design_id)?;
        Ok(next)
    }

    fn validate(&self, plant_id: &str) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(format!("plant '{}': {}", plant_id, msg)));
        if !(-90.0..=90.0).contains(&self.latitude) {
            return invalid("latitude must be within [-90, 90]");
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return invalid("longitude must be within [-180, 180]");
        }
        if !(self.capacity_kwp >= 0.0) {
            return invalid("capacity_kwp must be non-negative");
        }
        if !(0.0..=1.0).contains(&self.fault_probability_per_cycle) {
            return invalid("fault_probability_per_cycle must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.system_loss_fraction()) {
            return invalid("soiling_loss + mismatch_loss must be within [0, 1]");
        }
        Ok(())
    }
}

/// Partial update for a live [`SimulationConfig`].
#[derive(Debug, Deserialize, Serialize, Clone, Default, ToSchema)]
pub struct SimulationConfigPatch {
    pub design_id: Option<String>,
    pub capacity_kwp: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub inverter_count: Option<usize>,
    pub transformer_count: Option<usize>,
    pub panel_count: Option<usize>,
    pub enable_random_faults: Option<bool>,
    pub fault_probability_per_cycle: Option<f64>,
    pub soiling_loss: Option<f64>,
    pub mismatch_loss: Option<f64>,
    pub max_concurrent_panel_faults: Option<usize>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_json::from_str(content)?;
        config.validate()?;
        for plant in &mut config.plants {
            if plant.simulation.design_id.is_empty() {
                plant.simulation.design_id = plant.id.clone();
            }
        }
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.plants.is_empty() {
            return Err(ConfigError::Invalid("at least one plant is required".into()));
        }
        let mut seen = HashSet::new();
        for plant in &self.plants {
            if !seen.insert(plant.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate plant id '{}'", plant.id)));
            }
            plant.simulation.validate(&plant.id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "server": { "port": 8080 },
        "plants": [
            { "id": "boulder", "name": "Boulder Array", "capacity_kwp": 1000.0,
              "latitude": 40.0, "longitude": -105.0 }
        ]
    }"#;

    #[test]
    fn defaults_are_filled_in() {
        let config = Config::from_json(SAMPLE).unwrap();
        assert_eq!(config.update_interval_s, 5);
        assert!(!config.weather.offline_mode);
        assert_eq!(config.weather.base_url, OPEN_METEO_URL);

        let sim = &config.plants[0].simulation;
        assert_eq!(sim.design_id, "boulder");
        assert_eq!(sim.inverter_count, 4);
        assert_eq!(sim.max_concurrent_panel_faults, 5);
        assert!((sim.system_loss_fraction() - 0.04).abs() < 1e-12);
        assert_eq!(sim.seed, None);
    }

    #[test]
    fn duplicate_plant_ids_are_rejected() {
        let raw = r#"{
            "server": { "port": 8080 },
            "plants": [
                { "id": "a", "name": "A", "capacity_kwp": 10.0, "latitude": 1.0, "longitude": 1.0 },
                { "id": "a", "name": "B", "capacity_kwp": 10.0, "latitude": 1.0, "longitude": 1.0 }
            ]
        }"#;
        assert!(matches!(Config::from_json(raw), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn out_of_range_latitude_is_rejected() {
        let raw = SAMPLE.replace("40.0", "123.0");
        assert!(matches!(Config::from_json(&raw), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(Config::from_json("{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn patch_only_touches_present_fields() {
        let mut sim = SimulationConfig::new("x", 500.0, 10.0, 20.0);
        let patch = SimulationConfigPatch {
            capacity_kwp: Some(750.0),
            enable_random_faults: Some(false),
            ..Default::default()
        };
        sim.apply(&patch);
        assert_eq!(sim.capacity_kwp, 750.0);
        assert!(!sim.enable_random_faults);
        assert_eq!(sim.latitude, 10.0);
        assert_eq!(sim.inverter_count, 4);
    }

    #[test]
    fn patched_applies_the_load_time_rules() {
        let sim = SimulationConfig::new("x", 500.0, 10.0, 20.0);
        let bad = SimulationConfigPatch {
            latitude: Some(500.0),
            capacity_kwp: Some(-10.0),
            fault_probability_per_cycle: Some(7.0),
            soiling_loss: Some(3.0),
            ..Default::default()
        };
        assert!(matches!(sim.patched(&bad), Err(ConfigError::Invalid(_))));
        for bad in [
            SimulationConfigPatch { longitude: Some(1e20), ..Default::default() },
            SimulationConfigPatch { fault_probability_per_cycle: Some(7.0), ..Default::default() },
            SimulationConfigPatch { soiling_loss: Some(3.0), ..Default::default() },
            SimulationConfigPatch { capacity_kwp: Some(f64::NAN), ..Default::default() },
        ] {
            assert!(sim.patched(&bad).is_err(), "{:?}", bad);
        }

        let ok = SimulationConfigPatch { longitude: Some(-20.0), ..Default::default() };
        assert_eq!(sim.patched(&ok).unwrap().longitude, -20.0);
        assert_eq!(sim.longitude, 20.0);
    }
}
