/// ============================================================
///  Digital Twin Simulator
///
///  One instance = one plant. Each call to `generate_telemetry`
///  maps a weather sample to a telemetry snapshot:
///   1. expire due faults (lazy auto-clear)
///   2. local-midnight rollover of the daily energy counter
///   3. irradiance resolution (synthesised if the feed says 0 by day)
///   4. expected power from the irradiance model
///   5. inverters → transformers → panels, with fault draws
///   6. energy integration, KPIs, plant-wide performance alert
/// ============================================================

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::{ConfigError, SimulationConfig, SimulationConfigPatch};
use crate::models::telemetry::{
    ActiveFault, ActivePanelFault, ActiveSystemAlert, Alert, EquipmentStatus, FaultCategory,
    FaultDescriptor, InverterReading, MpptChannel, PanelFaultDescriptor, PanelFaultType,
    PanelReading, SystemMetrics, TelemetrySnapshot, TransformerReading, WeatherSample,
};
use crate::services::fault_catalogue::{
    FaultCatalogue, FaultSource, INVERTER_THERMAL_CODE, TRANSFORMER_OIL_CODE,
    TRANSFORMER_WINDING_CODE,
};
use crate::services::fault_registry::{FaultRegistry, expiry_after};
use crate::services::irradiance;

const MPPT_NOMINAL_V: f64 = 650.0;
/// Transformer fleet is rated at 110% of plant DC capacity.
const TRANSFORMER_OVERSIZE: f64 = 1.1;
/// Share of AC output that reaches the point of common coupling.
const GRID_EXPORT_FACTOR: f64 = 0.985;
const LOW_PR_THRESHOLD: f64 = 0.7;
const PANEL_PROBABILITY_SCALE: f64 = 0.3;

pub struct Simulator<F: FaultSource = FaultCatalogue> {
    config: SimulationConfig,
    faults: F,
    rng: StdRng,
    energy_kwh: f64,
    lifetime_energy_kwh: f64,
    last_sample: Option<DateTime<Utc>>,
    day_start: Option<NaiveDate>,
    active_faults: FaultRegistry<String, ActiveFault>,
    active_system_alerts: FaultRegistry<String, ActiveSystemAlert>,
    active_panel_faults: FaultRegistry<usize, ActivePanelFault>,
    pending_alerts: Vec<Alert>,
}

impl Simulator<FaultCatalogue> {
    /// Uses `config.seed` when set, OS entropy otherwise.
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_fault_source(config, FaultCatalogue::new(), rng)
    }

    pub fn with_seed(config: SimulationConfig, seed: u64) -> Self {
        Self::with_fault_source(config, FaultCatalogue::new(), StdRng::seed_from_u64(seed))
    }
}

impl<F: FaultSource> Simulator<F> {
    pub fn with_fault_source(config: SimulationConfig, faults: F, rng: StdRng) -> Self {
        Self {
            config,
            faults,
            rng,
            energy_kwh: 0.0,
            lifetime_energy_kwh: 0.0,
            last_sample: None,
            day_start: None,
            active_faults: FaultRegistry::new(),
            active_system_alerts: FaultRegistry::new(),
            active_panel_faults: FaultRegistry::new(),
            pending_alerts: Vec::new(),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[cfg(test)]
    pub fn energy_kwh(&self) -> f64 {
        self.energy_kwh
    }

    /// Faults still active at `now`; entries past their expiry are hidden
    /// even if no cycle has swept them yet.
    pub fn active_faults(&self, now: DateTime<Utc>) -> Vec<ActiveFault> {
        self.active_faults.live_at(now).cloned().collect()
    }

    pub fn active_system_alerts(&self, now: DateTime<Utc>) -> Vec<ActiveSystemAlert> {
        self.active_system_alerts.live_at(now).cloned().collect()
    }

    pub fn active_panel_faults(&self, now: DateTime<Utc>) -> Vec<ActivePanelFault> {
        self.active_panel_faults.live_at(now).cloned().collect()
    }

    #[cfg(test)]
    pub fn pending_alert_count(&self) -> usize {
        self.pending_alerts.len()
    }

    /// Drains alerts raised since the previous call.
    pub fn get_new_alerts(&mut self) -> Vec<Alert> {
        std::mem::take(&mut self.pending_alerts)
    }

    /// Merges `patch` into the live configuration. Energy counters and
    /// active faults are kept as they are. A patch that would leave the
    /// config out of range is rejected and nothing changes.
    pub fn update_config(&mut self, patch: &SimulationConfigPatch) -> Result<(), ConfigError> {
        self.config = self.config.patched(patch)?;
        info!(design_id = %self.config.design_id, ?patch, "simulation config updated");
        Ok(())
    }

    pub fn generate_telemetry_now(&mut self, weather: &WeatherSample) -> TelemetrySnapshot {
        self.generate_telemetry(weather, Utc::now())
    }

    pub fn generate_telemetry(&mut self, weather: &WeatherSample, now: DateTime<Utc>) -> TelemetrySnapshot {
        self.expire_faults(now);
        self.roll_day(weather, now);

        let ghi = self.resolve_irradiance(weather, now);
        let cell_temp = irradiance::cell_temperature(weather.temperature_c, ghi, irradiance::DEFAULT_NOCT_C);
        // Plant-level derating is referenced to ambient temperature; the
        // NOCT cell temperature only feeds the per-panel readings.
        let expected_power = irradiance::expected_power_kw(
            self.config.capacity_kwp,
            ghi,
            weather.temperature_c,
            self.config.system_loss_fraction(),
        );

        let inverters = self.simulate_inverters(weather, expected_power, now);
        let actual_power: f64 = inverters.iter().map(|inv| inv.ac_power_kw).sum();
        let online = inverters.iter().filter(|inv| inv.status != EquipmentStatus::Fault).count();
        let transformers = self.simulate_transformers(weather, actual_power, now);
        let panels = self.simulate_panels(ghi, cell_temp, now);

        if let Some(last) = self.last_sample {
            let hours = (now - last).num_milliseconds() as f64 / 3_600_000.0;
            if hours > 0.0 && actual_power > 0.0 {
                self.energy_kwh += actual_power * hours;
                self.lifetime_energy_kwh += actual_power * hours;
            }
        }

        let performance_ratio = if expected_power > 0.0 {
            actual_power / expected_power
        } else {
            1.0
        };
        let availability = online as f64 / inverters.len().max(1) as f64 * 100.0;

        if weather.is_day && performance_ratio < LOW_PR_THRESHOLD {
            if let Some(alert) = self.faults.check_performance_threshold(performance_ratio) {
                self.register_system_alert(alert, now);
            }
        }

        let capacity = self.config.capacity_kwp;
        let system = SystemMetrics {
            actual_power_kw: actual_power,
            expected_power_kw: expected_power,
            daily_energy_kwh: self.energy_kwh,
            lifetime_energy_kwh: self.lifetime_energy_kwh,
            performance_ratio,
            availability_percent: availability,
            grid_export_kw: actual_power * GRID_EXPORT_FACTOR,
            irradiance_w_m2: ghi,
            cell_temperature_c: cell_temp,
            specific_yield_kwh_kwp: if capacity > 0.0 { self.energy_kwh / capacity } else { 0.0 },
            capacity_factor_percent: if capacity > 0.0 { actual_power / capacity * 100.0 } else { 0.0 },
            active_fault_count: self.active_faults.len() + self.active_panel_faults.len(),
        };

        self.last_sample = Some(now);

        TelemetrySnapshot {
            design_id: self.config.design_id.clone(),
            timestamp: now,
            weather: weather.clone(),
            system,
            inverters,
            transformers,
            panels,
        }
    }

    // ─── Cycle steps ─────────────────────────────────────────────────────────

    fn expire_faults(&mut self, now: DateTime<Utc>) {
        for id in self.active_faults.sweep_expired(now) {
            info!(equipment_id = %id, "fault auto-cleared");
        }
        for title in self.active_system_alerts.sweep_expired(now) {
            info!(%title, "system alert auto-cleared");
        }
        for idx in self.active_panel_faults.sweep_expired(now) {
            info!(panel_index = idx, "panel fault auto-cleared");
        }
    }

    /// Coordinates clamped to their valid ranges.
    fn site(&self) -> (f64, f64) {
        (
            self.config.latitude.clamp(-90.0, 90.0),
            self.config.longitude.clamp(-180.0, 180.0),
        )
    }

    fn local_date(&self, weather: &WeatherSample, now: DateTime<Utc>) -> NaiveDate {
        let (_, lon) = self.site();
        let offset_s = weather
            .utc_offset_seconds
            .map(i64::from)
            .unwrap_or_else(|| (lon / 15.0).round() as i64 * 3600);
        now.checked_add_signed(Duration::seconds(offset_s))
            .unwrap_or(now)
            .date_naive()
    }

    fn roll_day(&mut self, weather: &WeatherSample, now: DateTime<Utc>) {
        let today = self.local_date(weather, now);
        match self.day_start {
            Some(day) if today > day => {
                info!(
                    design_id = %self.config.design_id,
                    %day,
                    energy_kwh = self.energy_kwh,
                    "day rollover, resetting daily energy"
                );
                self.energy_kwh = 0.0;
                self.day_start = Some(today);
            }
            Some(_) => {}
            None => self.day_start = Some(today),
        }
    }

    fn resolve_irradiance(&self, weather: &WeatherSample, now: DateTime<Utc>) -> f64 {
        if weather.is_day && weather.irradiance_w_m2 <= 0.0 {
            let (lat, lon) = self.site();
            let clear = irradiance::clear_sky_ghi(lat, lon, now);
            let ghi = irradiance::cloud_attenuated_ghi(clear, weather.cloud_cover_percent);
            debug!(clear_sky = clear, ghi, "weather reported no irradiance by day, synthesised");
            return ghi;
        }
        weather.irradiance_w_m2.max(0.0)
    }

    fn simulate_inverters(
        &mut self,
        weather: &WeatherSample,
        expected_power: f64,
        now: DateTime<Utc>,
    ) -> Vec<InverterReading> {
        let count = self.config.inverter_count.max(1);
        let share = expected_power / count as f64;
        let mut readings = Vec::with_capacity(count);

        for i in 0..count {
            let id = inverter_id(i);
            if self.config.enable_random_faults && !self.active_faults.contains(&id) {
                let p = self.config.fault_probability_per_cycle;
                if let Some(fault) = self.faults.maybe_generate_fault(&mut self.rng, FaultCategory::Inverter, &id, p) {
                    self.register_fault(&id, fault, now);
                }
            }
            let fault_code = self.active_faults.get(&id).map(|f| f.code.clone());

            let (ac, status) = if fault_code.is_some() {
                (0.0, EquipmentStatus::Fault)
            } else {
                let ac = share * self.rng.random_range(0.95..=1.05);
                (ac, if ac > 0.0 { EquipmentStatus::Online } else { EquipmentStatus::Standby })
            };
            let dc = ac * 1.02;

            let split = self.rng.random_range(0.48..=0.52);
            let mppt = [split, 1.0 - split]
                .iter()
                .enumerate()
                .map(|(ch, frac)| {
                    let power_kw = dc * frac;
                    let voltage_v = if power_kw > 0.0 {
                        MPPT_NOMINAL_V + self.rng.random_range(-25.0..=25.0)
                    } else {
                        0.0
                    };
                    let current_a = if voltage_v > 0.0 { power_kw * 1000.0 / voltage_v } else { 0.0 };
                    MpptChannel { channel: ch as u8 + 1, voltage_v, current_a, power_kw }
                })
                .collect();

            let temperature_c = if fault_code.as_deref() == Some(INVERTER_THERMAL_CODE) {
                self.rng.random_range(85.0..=95.0)
            } else {
                weather.temperature_c + self.rng.random_range(15.0..=25.0)
            };

            #[cfg(feature = "verbose_log")]
            debug!(inverter = %id, ac_kw = ac, dc_kw = dc, temperature_c, "inverter sample");

            readings.push(InverterReading {
                id,
                status,
                ac_power_kw: ac,
                dc_power_kw: dc,
                efficiency_percent: if dc > 0.0 { ac / dc * 100.0 } else { 0.0 },
                temperature_c,
                mppt,
                fault_code,
            });
        }
        readings
    }

    fn simulate_transformers(
        &mut self,
        weather: &WeatherSample,
        actual_power: f64,
        now: DateTime<Utc>,
    ) -> Vec<TransformerReading> {
        let count = self.config.transformer_count.max(1);
        let rated_kva = (self.config.capacity_kwp * TRANSFORMER_OVERSIZE / count as f64).max(1.0);
        let share = actual_power / count as f64;
        let mut readings = Vec::with_capacity(count);

        for i in 0..count {
            let id = transformer_id(i);
            if self.config.enable_random_faults && !self.active_faults.contains(&id) {
                let p = self.config.fault_probability_per_cycle / 2.0;
                if let Some(fault) = self.faults.maybe_generate_fault(&mut self.rng, FaultCategory::Transformer, &id, p) {
                    self.register_fault(&id, fault, now);
                }
            }
            let fault_code = self.active_faults.get(&id).map(|f| f.code.clone());

            let load_percent = share / rated_kva * 100.0 + self.rng.random_range(0.0..=2.0);
            let winding_temp_c = if fault_code.as_deref() == Some(TRANSFORMER_WINDING_CODE) {
                self.rng.random_range(95.0..=105.0)
            } else {
                weather.temperature_c + 20.0 + 0.5 * load_percent
            };
            let oil_temp_c = if fault_code.as_deref() == Some(TRANSFORMER_OIL_CODE) {
                self.rng.random_range(80.0..=90.0)
            } else {
                weather.temperature_c + 10.0 + 0.35 * load_percent
            };
            let status = match (&fault_code, share > 0.0) {
                (Some(_), _) => EquipmentStatus::Fault,
                (None, true) => EquipmentStatus::Online,
                (None, false) => EquipmentStatus::Standby,
            };

            readings.push(TransformerReading { id, status, load_percent, winding_temp_c, oil_temp_c, fault_code });
        }
        readings
    }

    fn simulate_panels(&mut self, ghi: f64, cell_temp: f64, now: DateTime<Utc>) -> Vec<PanelReading> {
        let count = self.config.panel_count;
        // keeps the plant-wide panel fault rate roughly independent of plant size
        let p = self.config.fault_probability_per_cycle * PANEL_PROBABILITY_SCALE
            / (count as f64 / 100.0).max(1.0);
        let mut readings = Vec::with_capacity(count);

        for index in 0..count {
            if self.config.enable_random_faults
                && self.active_panel_faults.len() < self.config.max_concurrent_panel_faults
                && !self.active_panel_faults.contains(&index)
            {
                if let Some(fault) = self.faults.maybe_generate_panel_fault(&mut self.rng, index, p) {
                    self.register_panel_fault(index, fault, now);
                }
            }
            let active = self.active_panel_faults.get(&index);
            let fault_type = active.map(|f| f.fault_type);
            let impact = active.map_or(1.0, |f| f.performance_impact);

            let jitter = self.rng.random_range(0.95..=1.05);
            let cell_temp_c = if fault_type == Some(PanelFaultType::HotSpot) {
                cell_temp + 20.0 + self.rng.random_range(-15.0..=15.0)
            } else {
                cell_temp + self.rng.random_range(-3.0..=3.0)
            };

            readings.push(PanelReading {
                index,
                irradiance_w_m2: ghi * jitter * impact,
                performance_index: jitter * impact,
                cell_temp_c,
                fault_type,
            });
        }
        readings
    }

    // ─── Fault lifecycle ─────────────────────────────────────────────────────

    fn register_fault(&mut self, equipment_id: &str, fault: FaultDescriptor, now: DateTime<Utc>) -> Option<Alert> {
        let entry = ActiveFault {
            equipment_id: equipment_id.to_string(),
            code: fault.code.clone(),
            severity: fault.severity,
            category: fault.category,
            message: fault.message.clone(),
            auto_clear_ms: fault.auto_clear_ms,
            raised_at: now,
            expires_at: expiry_after(now, fault.auto_clear_ms),
        };
        if !self.active_faults.register(equipment_id.to_string(), entry) {
            return None;
        }
        info!(equipment_id, code = %fault.code, severity = ?fault.severity, "fault raised");
        Some(self.enqueue(&fault, Some(equipment_id.to_string()), None, now))
    }

    fn register_system_alert(&mut self, alert: FaultDescriptor, now: DateTime<Utc>) -> Option<Alert> {
        let entry = ActiveSystemAlert {
            title: alert.title.clone(),
            code: alert.code.clone(),
            severity: alert.severity,
            message: alert.message.clone(),
            raised_at: now,
            expires_at: expiry_after(now, alert.auto_clear_ms),
        };
        if !self.active_system_alerts.register(alert.title.clone(), entry) {
            return None;
        }
        info!(title = %alert.title, code = %alert.code, "system alert raised");
        Some(self.enqueue(&alert, None, None, now))
    }

    fn register_panel_fault(&mut self, panel_index: usize, fault: PanelFaultDescriptor, now: DateTime<Utc>) -> Option<Alert> {
        if self.active_panel_faults.len() >= self.config.max_concurrent_panel_faults {
            return None;
        }
        let entry = ActivePanelFault {
            panel_index,
            fault_type: fault.fault_type,
            performance_impact: fault.performance_impact.clamp(f64::MIN_POSITIVE, 1.0),
            raised_at: now,
            expires_at: expiry_after(now, fault.alert.auto_clear_ms),
        };
        if !self.active_panel_faults.register(panel_index, entry) {
            return None;
        }
        info!(panel_index, fault_type = ?fault.fault_type, "panel fault raised");
        Some(self.enqueue(&fault.alert, Some(panel_id(panel_index)), Some(panel_index), now))
    }

    fn enqueue(
        &mut self,
        fault: &FaultDescriptor,
        equipment_id: Option<String>,
        panel_index: Option<usize>,
        now: DateTime<Utc>,
    ) -> Alert {
        let id = uuid::Builder::from_random_bytes(self.rng.random()).into_uuid();
        let alert = Alert::from_descriptor(id, &self.config.design_id, fault, equipment_id, panel_index, now);
        self.pending_alerts.push(alert.clone());
        alert
    }

    /// Forces a fault onto the first healthy unit of `category` (a random
    /// healthy panel for panels). `None` when every unit is already faulted.
    pub fn inject_fault(&mut self, category: FaultCategory, now: DateTime<Utc>) -> Option<Alert> {
        self.expire_faults(now);
        match category {
            FaultCategory::Inverter | FaultCategory::Transformer => {
                let (count, id_of): (usize, fn(usize) -> String) = if category == FaultCategory::Inverter {
                    (self.config.inverter_count.max(1), inverter_id)
                } else {
                    (self.config.transformer_count.max(1), transformer_id)
                };
                let id = (0..count).map(id_of).find(|id| !self.active_faults.contains(id))?;
                let fault = self.faults.generate_random_fault(&mut self.rng, category, &id);
                self.register_fault(&id, fault, now)
            }
            FaultCategory::Panel => {
                if self.active_panel_faults.len() >= self.config.max_concurrent_panel_faults {
                    return None;
                }
                let healthy: Vec<usize> = (0..self.config.panel_count)
                    .filter(|i| !self.active_panel_faults.contains(i))
                    .collect();
                if healthy.is_empty() {
                    return None;
                }
                let index = healthy[self.rng.random_range(0..healthy.len())];
                let fault = self.faults.generate_random_panel_fault(&mut self.rng, index);
                self.register_panel_fault(index, fault, now)
            }
            FaultCategory::System => {
                let design_id = self.config.design_id.clone();
                let fault = self.faults.generate_random_fault(&mut self.rng, category, &design_id);
                self.register_system_alert(fault, now)
            }
        }
    }

    pub fn clear_fault(&mut self, equipment_id: &str) -> bool {
        let cleared = self.active_faults.clear(&equipment_id.to_string());
        if cleared {
            info!(equipment_id, "fault cleared manually");
        }
        cleared
    }

    pub fn clear_system_alert(&mut self, title: &str) -> bool {
        self.active_system_alerts.clear(&title.to_string())
    }

    pub fn clear_panel_fault(&mut self, panel_index: usize) -> bool {
        self.active_panel_faults.clear(&panel_index)
    }

    /// Clears every active fault and alert; returns how many were removed.
    pub fn clear_all_faults(&mut self) -> usize {
        let n = self.active_faults.clear_all()
            + self.active_system_alerts.clear_all()
            + self.active_panel_faults.clear_all();
        info!(design_id = %self.config.design_id, cleared = n, "all faults cleared");
        n
    }
}

fn inverter_id(i: usize) -> String {
    format!("INV-{:02}", i + 1)
}

fn transformer_id(i: usize) -> String {
    format!("TRF-{:02}", i + 1)
}

fn panel_id(i: usize) -> String {
    format!("PNL-{:04}", i)
}
