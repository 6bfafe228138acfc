use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;

use crate::config::{Config, ConfigError, PlantConfig, SimulationConfigPatch};
use crate::models::telemetry::{Alert, FaultCategory, PlantSummary, TelemetrySnapshot, WeatherSample};
use crate::services::simulator::Simulator;
use crate::services::weather_service::WeatherClient;

/// Alerts kept per plant once drained from the simulator.
pub const ALARM_LOG_CAPACITY: usize = 500;

/// Everything the daemon knows about one plant. The simulator is the only
/// owner of fault and energy state; the rest is a cache for readers.
pub struct PlantHandle {
    pub plant: PlantConfig,
    simulator: Mutex<Simulator>,
    latest: RwLock<Option<TelemetrySnapshot>>,
    alarm_log: RwLock<VecDeque<Alert>>,
}

impl PlantHandle {
    pub fn new(plant: PlantConfig) -> Self {
        let simulator = Simulator::new(plant.simulation.clone());
        Self {
            plant,
            simulator: Mutex::new(simulator),
            latest: RwLock::new(None),
            alarm_log: RwLock::new(VecDeque::new()),
        }
    }

    /// Runs one simulation cycle, drains its alerts into the log and
    /// remembers the snapshot.
    pub fn tick(&self, weather: &WeatherSample) -> Option<(TelemetrySnapshot, Vec<Alert>)> {
        let (snapshot, alerts) = {
            let mut sim = self.simulator.lock().ok()?;
            let snapshot = sim.generate_telemetry_now(weather);
            (snapshot, sim.get_new_alerts())
        };
        self.record_alerts(&alerts);
        if let Ok(mut latest) = self.latest.write() {
            *latest = Some(snapshot.clone());
        }
        Some((snapshot, alerts))
    }

    fn record_alerts(&self, alerts: &[Alert]) {
        if let Ok(mut log) = self.alarm_log.write() {
            for alert in alerts {
                if log.len() == ALARM_LOG_CAPACITY {
                    log.pop_front();
                }
                log.push_back(alert.clone());
            }
        }
    }

    pub fn latest(&self) -> Option<TelemetrySnapshot> {
        self.latest.read().ok()?.clone()
    }

    /// Most recent first.
    pub fn recent_alerts(&self) -> Vec<Alert> {
        match self.alarm_log.read() {
            Ok(log) => log.iter().rev().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn inject_fault(&self, category: FaultCategory) -> Option<Alert> {
        let alerts = {
            let mut sim = self.simulator.lock().ok()?;
            sim.inject_fault(category, Utc::now())?;
            sim.get_new_alerts()
        };
        self.record_alerts(&alerts);
        alerts.into_iter().last()
    }

    pub fn clear_faults(&self) -> usize {
        self.simulator.lock().map(|mut sim| sim.clear_all_faults()).unwrap_or(0)
    }

    /// Removes the active fault of one inverter or transformer.
    pub fn clear_fault(&self, equipment_id: &str) -> bool {
        self.simulator.lock().is_ok_and(|mut sim| sim.clear_fault(equipment_id))
    }

    pub fn clear_panel_fault(&self, panel_index: usize) -> bool {
        self.simulator.lock().is_ok_and(|mut sim| sim.clear_panel_fault(panel_index))
    }

    pub fn clear_system_alert(&self, title: &str) -> bool {
        self.simulator.lock().is_ok_and(|mut sim| sim.clear_system_alert(title))
    }

    pub fn update_config(&self, patch: &SimulationConfigPatch) -> Result<(), ConfigError> {
        let mut sim = self
            .simulator
            .lock()
            .map_err(|_| ConfigError::Invalid(format!("plant '{}' is unavailable", self.plant.id)))?;
        sim.update_config(patch)
    }

    /// Current coordinates; a config patch may have moved the plant.
    pub fn location(&self) -> (f64, f64) {
        match self.simulator.lock() {
            Ok(sim) => (sim.config().latitude, sim.config().longitude),
            Err(_) => (self.plant.simulation.latitude, self.plant.simulation.longitude),
        }
    }

    pub fn summary(&self) -> PlantSummary {
        let latest = self.latest();
        let mut summary = PlantSummary {
            id: self.plant.id.clone(),
            name: self.plant.name.clone(),
            design_id: self.plant.simulation.design_id.clone(),
            capacity_kwp: self.plant.simulation.capacity_kwp,
            latitude: self.plant.simulation.latitude,
            longitude: self.plant.simulation.longitude,
            last_update: latest.as_ref().map(|s| s.timestamp),
            actual_power_kw: latest.as_ref().map(|s| s.system.actual_power_kw),
            active_faults: Vec::new(),
            active_panel_faults: Vec::new(),
            active_system_alerts: Vec::new(),
        };
        if let Ok(sim) = self.simulator.lock() {
            let cfg = sim.config();
            summary.design_id = cfg.design_id.clone();
            summary.capacity_kwp = cfg.capacity_kwp;
            summary.latitude = cfg.latitude;
            summary.longitude = cfg.longitude;
            let now = Utc::now();
            summary.active_faults = sim.active_faults(now);
            summary.active_panel_faults = sim.active_panel_faults(now);
            summary.active_system_alerts = sim.active_system_alerts(now);
        }
        summary
    }
}

#[derive(Clone)]
pub struct AppState {
    /// Map of plant_id to its simulator handle
    pub plants: Arc<HashMap<String, Arc<PlantHandle>>>,
    pub weather: WeatherClient,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let plants = config
            .plants
            .iter()
            .map(|p| (p.id.clone(), Arc::new(PlantHandle::new(p.clone()))))
            .collect();
        Self {
            plants: Arc::new(plants),
            weather: WeatherClient::new(&config.weather),
        }
    }

    pub fn plant(&self, id: &str) -> Option<Arc<PlantHandle>> {
        self.plants.get(id).cloned()
    }

    /// Plants sorted by id.
    pub fn summaries(&self) -> Vec<PlantSummary> {
        let mut out: Vec<PlantSummary> = self.plants.values().map(|p| p.summary()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use chrono::{Duration, TimeZone};

    fn handle() -> PlantHandle {
        let mut sim = SimulationConfig::new("turin", 250.0, 45.07, 7.33);
        sim.enable_random_faults = false;
        sim.seed = Some(42);
        PlantHandle::new(PlantConfig { id: "turin".into(), name: "Turin".into(), simulation: sim })
    }

    #[test]
    fn tick_stores_latest_snapshot() {
        let h = handle();
        assert!(h.latest().is_none());
        let (snap, alerts) = h.tick(&WeatherSample::clear_day(850.0, 24.0)).unwrap();
        assert!(alerts.is_empty());
        assert_eq!(h.latest().unwrap().timestamp, snap.timestamp);
        assert_eq!(h.summary().last_update, Some(snap.timestamp));
    }

    #[test]
    fn injected_faults_land_in_the_alarm_log() {
        let h = handle();
        let alert = h.inject_fault(FaultCategory::Inverter).unwrap();
        assert_eq!(alert.equipment_id.as_deref(), Some("INV-01"));
        assert_eq!(h.recent_alerts().len(), 1);
        assert_eq!(h.summary().active_faults.len(), 1);
        assert_eq!(h.clear_faults(), 1);
        assert!(h.summary().active_faults.is_empty());
    }

    #[test]
    fn alarm_log_is_bounded() {
        let h = handle();
        let t = Utc.with_ymd_and_hms(2025, 6, 21, 11, 0, 0).unwrap();
        let alert = h.inject_fault(FaultCategory::Inverter).unwrap();
        let burst: Vec<Alert> = (0..ALARM_LOG_CAPACITY + 20)
            .map(|i| Alert { timestamp: t + Duration::seconds(i as i64), ..alert.clone() })
            .collect();
        h.record_alerts(&burst);
        let log = h.recent_alerts();
        assert_eq!(log.len(), ALARM_LOG_CAPACITY);
        assert_eq!(log[0].timestamp, t + Duration::seconds((ALARM_LOG_CAPACITY + 19) as i64));
    }

    #[test]
    fn targeted_clears_reach_the_simulator() {
        let h = handle();
        h.inject_fault(FaultCategory::Transformer).unwrap();
        let panel = h.inject_fault(FaultCategory::Panel).unwrap();
        let system = h.inject_fault(FaultCategory::System).unwrap();

        assert!(h.clear_fault("TRF-01"));
        assert!(!h.clear_fault("TRF-01"));
        assert!(h.clear_panel_fault(panel.panel_index.unwrap()));
        assert!(h.clear_system_alert(&system.title));
        let summary = h.summary();
        assert!(summary.active_faults.is_empty());
        assert!(summary.active_panel_faults.is_empty());
        assert!(summary.active_system_alerts.is_empty());
    }

    #[test]
    fn rejected_patch_keeps_the_old_config() {
        let h = handle();
        let bad = SimulationConfigPatch { latitude: Some(500.0), ..Default::default() };
        assert!(h.update_config(&bad).is_err());
        assert_eq!(h.location(), (45.07, 7.33));
    }
}
