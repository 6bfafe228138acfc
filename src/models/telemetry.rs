use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// ─── Weather input ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeatherSource {
    Live,
    Fallback,
}

/// One ambient-weather sample, produced once per cycle by the weather client.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WeatherSample {
    /// Ambient air temperature at 2 m (°C)
    pub temperature_c: f64,
    /// Total cloud cover (%)
    pub cloud_cover_percent: f64,
    /// Global horizontal irradiance (W/m²)
    pub irradiance_w_m2: f64,
    /// Wind speed at 10 m (m/s)
    pub wind_speed_m_s: f64,
    /// Relative humidity (%)
    pub humidity_percent: f64,
    pub is_day: bool,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    /// Offset of the plant's local clock from UTC, when the source knows it.
    pub utc_offset_seconds: Option<i32>,
    pub source: WeatherSource,
}

#[cfg(test)]
impl WeatherSample {
    /// Clear daytime sample with no sunrise/sunset information.
    pub fn clear_day(irradiance_w_m2: f64, temperature_c: f64) -> Self {
        Self {
            temperature_c,
            cloud_cover_percent: 0.0,
            irradiance_w_m2,
            wind_speed_m_s: 3.0,
            humidity_percent: 50.0,
            is_day: true,
            sunrise: None,
            sunset: None,
            utc_offset_seconds: None,
            source: WeatherSource::Fallback,
        }
    }
}

// ─── Alarm / fault vocabulary ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FaultCategory {
    Inverter,
    Transformer,
    Panel,
    System,
}

impl fmt::Display for FaultCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FaultCategory::Inverter => "inverter",
            FaultCategory::Transformer => "transformer",
            FaultCategory::Panel => "panel",
            FaultCategory::System => "system",
        };
        f.write_str(s)
    }
}

impl FromStr for FaultCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inverter" => Ok(FaultCategory::Inverter),
            "transformer" => Ok(FaultCategory::Transformer),
            "panel" => Ok(FaultCategory::Panel),
            "system" => Ok(FaultCategory::System),
            other => Err(format!("unknown fault category '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PanelFaultType {
    HotSpot,
    Soiling,
    Crack,
    BypassDiode,
    Shading,
}

/// Fault produced by the fault catalogue. The simulator only does the
/// lifecycle bookkeeping; everything in here comes from the catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultDescriptor {
    pub code: String,
    pub severity: AlarmSeverity,
    pub category: FaultCategory,
    pub title: String,
    pub message: String,
    /// 0 = stays active until cleared by hand.
    pub auto_clear_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelFaultDescriptor {
    pub fault_type: PanelFaultType,
    /// Output multiplier in (0, 1].
    pub performance_impact: f64,
    pub alert: FaultDescriptor,
}

/// Alert handed to the caller through `Simulator::get_new_alerts`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Alert {
    pub id: Uuid,
    pub design_id: String,
    pub code: String,
    pub severity: AlarmSeverity,
    pub category: FaultCategory,
    pub title: String,
    pub message: String,
    pub equipment_id: Option<String>,
    pub panel_index: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    /// `id` comes from the caller so seeded runs replay the same ids.
    pub fn from_descriptor(
        id: Uuid,
        design_id: &str,
        fault: &FaultDescriptor,
        equipment_id: Option<String>,
        panel_index: Option<usize>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            design_id: design_id.to_string(),
            code: fault.code.clone(),
            severity: fault.severity,
            category: fault.category,
            title: fault.title.clone(),
            message: fault.message.clone(),
            equipment_id,
            panel_index,
            timestamp,
        }
    }
}

// ─── Active fault state ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActiveFault {
    pub equipment_id: String,
    pub code: String,
    pub severity: AlarmSeverity,
    pub category: FaultCategory,
    pub message: String,
    pub auto_clear_ms: u64,
    pub raised_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActiveSystemAlert {
    pub title: String,
    pub code: String,
    pub severity: AlarmSeverity,
    pub message: String,
    pub raised_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActivePanelFault {
    pub panel_index: usize,
    pub fault_type: PanelFaultType,
    pub performance_impact: f64,
    pub raised_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

// ─── Telemetry snapshot ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentStatus {
    Online,
    Standby,
    Fault,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MpptChannel {
    pub channel: u8,
    pub voltage_v: f64,
    pub current_a: f64,
    pub power_kw: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InverterReading {
    pub id: String,
    pub status: EquipmentStatus,
    pub ac_power_kw: f64,
    pub dc_power_kw: f64,
    /// AC/DC conversion efficiency (%)
    pub efficiency_percent: f64,
    /// Heatsink temperature (°C)
    pub temperature_c: f64,
    pub mppt: Vec<MpptChannel>,
    pub fault_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransformerReading {
    pub id: String,
    pub status: EquipmentStatus,
    pub load_percent: f64,
    pub winding_temp_c: f64,
    pub oil_temp_c: f64,
    pub fault_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PanelReading {
    pub index: usize,
    pub irradiance_w_m2: f64,
    /// Relative output of this panel, 1.0 = nominal
    pub performance_index: f64,
    pub cell_temp_c: f64,
    pub fault_type: Option<PanelFaultType>,
}

/// Plant-level KPIs (IEC 61724 flavoured).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SystemMetrics {
    pub actual_power_kw: f64,
    pub expected_power_kw: f64,
    /// Energy produced since local midnight (kWh)
    pub daily_energy_kwh: f64,
    /// Energy produced since the simulator started (kWh)
    pub lifetime_energy_kwh: f64,
    /// actual / expected, exactly 1.0 when nothing is expected
    pub performance_ratio: f64,
    pub availability_percent: f64,
    pub grid_export_kw: f64,
    pub irradiance_w_m2: f64,
    pub cell_temperature_c: f64,
    pub specific_yield_kwh_kwp: f64,
    pub capacity_factor_percent: f64,
    pub active_fault_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TelemetrySnapshot {
    pub design_id: String,
    pub timestamp: DateTime<Utc>,
    pub weather: WeatherSample,
    pub system: SystemMetrics,
    pub inverters: Vec<InverterReading>,
    pub transformers: Vec<TransformerReading>,
    pub panels: Vec<PanelReading>,
}

// ─── Open-Meteo wire types ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CurrentWeatherResponse {
    pub utc_offset_seconds: Option<i32>,
    pub current: CurrentData,
    pub daily: Option<DailyData>,
}

#[derive(Debug, Deserialize)]
pub struct CurrentData {
    pub time: String,
    pub temperature_2m: Option<f64>,
    pub relative_humidity_2m: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub shortwave_radiation: Option<f64>,
    pub wind_speed_10m: Option<f64>,
    pub is_day: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct DailyData {
    #[serde(default)]
    pub sunrise: Vec<String>,
    #[serde(default)]
    pub sunset: Vec<String>,
}

// ─── REST API response types ──────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct PlantSummary {
    pub id: String,
    pub name: String,
    pub design_id: String,
    pub capacity_kwp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub last_update: Option<DateTime<Utc>>,
    pub actual_power_kw: Option<f64>,
    pub active_faults: Vec<ActiveFault>,
    pub active_panel_faults: Vec<ActivePanelFault>,
    pub active_system_alerts: Vec<ActiveSystemAlert>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OfflineModeBody {
    pub enabled: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClearFaultsResponse {
    pub cleared: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_category_parses_case_insensitively() {
        assert_eq!("Inverter".parse::<FaultCategory>(), Ok(FaultCategory::Inverter));
        assert_eq!("PANEL".parse::<FaultCategory>(), Ok(FaultCategory::Panel));
        assert!("battery".parse::<FaultCategory>().is_err());
    }

    #[test]
    fn open_meteo_payload_decodes() {
        let raw = r#"{
            "utc_offset_seconds": 7200,
            "current": {
                "time": "2025-06-21T12:00",
                "temperature_2m": 27.4,
                "relative_humidity_2m": 41,
                "cloud_cover": 12,
                "shortwave_radiation": 845.0,
                "wind_speed_10m": 3.2,
                "is_day": 1
            },
            "daily": { "sunrise": ["2025-06-21T05:41"], "sunset": ["2025-06-21T21:17"] }
        }"#;
        let resp: CurrentWeatherResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.utc_offset_seconds, Some(7200));
        assert_eq!(resp.current.is_day, Some(1));
        assert_eq!(resp.daily.unwrap().sunset[0], "2025-06-21T21:17");
    }
}
