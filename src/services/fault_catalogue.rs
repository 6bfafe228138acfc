//! Fault catalogue: which faults exist, how likely they are and how long they
//! last. The simulator asks this module for faults and only keeps the books.

use rand::Rng;

use crate::models::telemetry::{
    AlarmSeverity, FaultCategory, FaultDescriptor, PanelFaultDescriptor, PanelFaultType,
};

/// Inverter fault code that overrides the heatsink temperature.
pub const INVERTER_THERMAL_CODE: &str = "INV_OVERTEMP";
pub const TRANSFORMER_WINDING_CODE: &str = "TRF_WINDING_OVERHEAT";
pub const TRANSFORMER_OIL_CODE: &str = "TRF_OIL_OVERHEAT";

pub const LOW_PERFORMANCE_TITLE: &str = "Low Performance Ratio";
pub const CRITICAL_PERFORMANCE_TITLE: &str = "Critical Performance Degradation";

const MINUTE_MS: u64 = 60_000;
const SYSTEM_ALERT_CLEAR_MS: u64 = 30 * MINUTE_MS;

/// Source of fault descriptors consumed by the simulator.
pub trait FaultSource {
    /// One Bernoulli trial at `probability`; `Some` on success.
    fn maybe_generate_fault<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        category: FaultCategory,
        equipment_id: &str,
        probability: f64,
    ) -> Option<FaultDescriptor>;

    fn maybe_generate_panel_fault<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        panel_index: usize,
        probability: f64,
    ) -> Option<PanelFaultDescriptor>;

    /// Deterministic plant-wide rule on the performance ratio.
    fn check_performance_threshold(&self, performance_ratio: f64) -> Option<FaultDescriptor>;

    /// Manual injection: always yields a fault, no probability draw.
    fn generate_random_fault<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        category: FaultCategory,
        equipment_id: &str,
    ) -> FaultDescriptor;

    /// Manual injection for a panel.
    fn generate_random_panel_fault<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        panel_index: usize,
    ) -> PanelFaultDescriptor;
}

struct FaultTemplate {
    code: &'static str,
    severity: AlarmSeverity,
    title: &'static str,
    message: &'static str,
    auto_clear_ms: u64,
}

const INVERTER_FAULTS: &[FaultTemplate] = &[
    FaultTemplate {
        code: INVERTER_THERMAL_CODE,
        severity: AlarmSeverity::Warning,
        title: "Inverter Overtemperature",
        message: "heatsink temperature above derating threshold",
        auto_clear_ms: 10 * MINUTE_MS,
    },
    FaultTemplate {
        code: "INV_GRID_FAULT",
        severity: AlarmSeverity::Critical,
        title: "Grid Fault",
        message: "AC voltage or frequency outside protection limits, inverter tripped",
        auto_clear_ms: 5 * MINUTE_MS,
    },
    FaultTemplate {
        code: "INV_ISOLATION_FAULT",
        severity: AlarmSeverity::Critical,
        title: "Isolation Fault",
        message: "DC isolation resistance below 1 MΩ, manual inspection required",
        auto_clear_ms: 0,
    },
    FaultTemplate {
        code: "INV_COMM_LOSS",
        severity: AlarmSeverity::Warning,
        title: "Communication Loss",
        message: "no response from inverter controller",
        auto_clear_ms: 2 * MINUTE_MS,
    },
    FaultTemplate {
        code: "INV_MPPT_FAILURE",
        severity: AlarmSeverity::Warning,
        title: "MPPT Failure",
        message: "MPPT tracker failed to converge",
        auto_clear_ms: 15 * MINUTE_MS,
    },
];

const TRANSFORMER_FAULTS: &[FaultTemplate] = &[
    FaultTemplate {
        code: TRANSFORMER_WINDING_CODE,
        severity: AlarmSeverity::Critical,
        title: "Winding Overheat",
        message: "winding hot-spot temperature above 95 °C",
        auto_clear_ms: 20 * MINUTE_MS,
    },
    FaultTemplate {
        code: TRANSFORMER_OIL_CODE,
        severity: AlarmSeverity::Warning,
        title: "Oil Overheat",
        message: "top-oil temperature above 80 °C",
        auto_clear_ms: 30 * MINUTE_MS,
    },
    FaultTemplate {
        code: "TRF_BUCHHOLZ_ALARM",
        severity: AlarmSeverity::Critical,
        title: "Buchholz Relay Alarm",
        message: "gas accumulation detected in Buchholz relay",
        auto_clear_ms: 0,
    },
];

const SYSTEM_FAULTS: &[FaultTemplate] = &[
    FaultTemplate {
        code: "SYS_GRID_CURTAILMENT",
        severity: AlarmSeverity::Warning,
        title: "Grid Curtailment",
        message: "export limited by grid operator setpoint",
        auto_clear_ms: 15 * MINUTE_MS,
    },
    FaultTemplate {
        code: "SYS_SCADA_LINK",
        severity: AlarmSeverity::Warning,
        title: "SCADA Link Degraded",
        message: "plant controller heartbeat delayed",
        auto_clear_ms: 5 * MINUTE_MS,
    },
];

struct PanelFaultTemplate {
    fault_type: PanelFaultType,
    code: &'static str,
    severity: AlarmSeverity,
    title: &'static str,
    impact: (f64, f64),
    auto_clear_ms: u64,
}

const PANEL_FAULTS: &[PanelFaultTemplate] = &[
    PanelFaultTemplate {
        fault_type: PanelFaultType::HotSpot,
        code: "PNL_HOT_SPOT",
        severity: AlarmSeverity::Warning,
        title: "Panel Hot Spot",
        impact: (0.60, 0.80),
        auto_clear_ms: 60 * MINUTE_MS,
    },
    PanelFaultTemplate {
        fault_type: PanelFaultType::Soiling,
        code: "PNL_SOILING",
        severity: AlarmSeverity::Info,
        title: "Panel Soiling",
        impact: (0.85, 0.95),
        auto_clear_ms: 120 * MINUTE_MS,
    },
    PanelFaultTemplate {
        fault_type: PanelFaultType::Crack,
        code: "PNL_CRACK",
        severity: AlarmSeverity::Warning,
        title: "Cell Crack",
        impact: (0.70, 0.90),
        auto_clear_ms: 0,
    },
    PanelFaultTemplate {
        fault_type: PanelFaultType::BypassDiode,
        code: "PNL_BYPASS_DIODE",
        severity: AlarmSeverity::Critical,
        title: "Bypass Diode Failure",
        impact: (0.55, 0.70),
        auto_clear_ms: 0,
    },
    PanelFaultTemplate {
        fault_type: PanelFaultType::Shading,
        code: "PNL_SHADING",
        severity: AlarmSeverity::Info,
        title: "Partial Shading",
        impact: (0.50, 0.80),
        auto_clear_ms: 30 * MINUTE_MS,
    },
];

/// Built-in catalogue of inverter, transformer and panel faults.
#[derive(Debug, Clone, Default)]
pub struct FaultCatalogue;

impl FaultCatalogue {
    pub fn new() -> Self {
        Self
    }

    fn templates(category: FaultCategory) -> Option<&'static [FaultTemplate]> {
        match category {
            FaultCategory::Inverter => Some(INVERTER_FAULTS),
            FaultCategory::Transformer => Some(TRANSFORMER_FAULTS),
            FaultCategory::System => Some(SYSTEM_FAULTS),
            FaultCategory::Panel => None,
        }
    }

    fn describe(template: &FaultTemplate, category: FaultCategory, equipment_id: &str) -> FaultDescriptor {
        FaultDescriptor {
            code: template.code.to_string(),
            severity: template.severity,
            category,
            title: template.title.to_string(),
            message: format!("{}: {}", equipment_id, template.message),
            auto_clear_ms: template.auto_clear_ms,
        }
    }

    fn describe_panel<R: Rng + ?Sized>(rng: &mut R, template: &PanelFaultTemplate, panel_index: usize) -> PanelFaultDescriptor {
        let (lo, hi) = template.impact;
        let performance_impact = rng.random_range(lo..=hi);
        PanelFaultDescriptor {
            fault_type: template.fault_type,
            performance_impact,
            alert: FaultDescriptor {
                code: template.code.to_string(),
                severity: template.severity,
                category: FaultCategory::Panel,
                title: template.title.to_string(),
                message: format!(
                    "panel #{}: output reduced to {:.0}% of nominal",
                    panel_index,
                    performance_impact * 100.0
                ),
                auto_clear_ms: template.auto_clear_ms,
            },
        }
    }
}

impl FaultSource for FaultCatalogue {
    fn maybe_generate_fault<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        category: FaultCategory,
        equipment_id: &str,
        probability: f64,
    ) -> Option<FaultDescriptor> {
        if rng.random::<f64>() >= probability {
            return None;
        }
        Some(self.generate_random_fault(rng, category, equipment_id))
    }

    fn maybe_generate_panel_fault<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        panel_index: usize,
        probability: f64,
    ) -> Option<PanelFaultDescriptor> {
        if rng.random::<f64>() >= probability {
            return None;
        }
        Some(self.generate_random_panel_fault(rng, panel_index))
    }

    fn check_performance_threshold(&self, performance_ratio: f64) -> Option<FaultDescriptor> {
        let (code, severity, title) = if performance_ratio < 0.5 {
            ("SYS_PR_CRITICAL", AlarmSeverity::Critical, CRITICAL_PERFORMANCE_TITLE)
        } else if performance_ratio < 0.7 {
            ("SYS_PR_LOW", AlarmSeverity::Warning, LOW_PERFORMANCE_TITLE)
        } else {
            return None;
        };
        Some(FaultDescriptor {
            code: code.to_string(),
            severity,
            category: FaultCategory::System,
            title: title.to_string(),
            message: format!("plant performance ratio at {:.1}%", performance_ratio * 100.0),
            auto_clear_ms: SYSTEM_ALERT_CLEAR_MS,
        })
    }

    fn generate_random_fault<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        category: FaultCategory,
        equipment_id: &str,
    ) -> FaultDescriptor {
        match Self::templates(category) {
            Some(templates) => {
                let idx = rng.random_range(0..templates.len());
                Self::describe(&templates[idx], category, equipment_id)
            }
            None => {
                let t = &PANEL_FAULTS[rng.random_range(0..PANEL_FAULTS.len())];
                FaultDescriptor {
                    code: t.code.to_string(),
                    severity: t.severity,
                    category,
                    title: t.title.to_string(),
                    message: format!("{}: {}", equipment_id, t.title.to_lowercase()),
                    auto_clear_ms: t.auto_clear_ms,
                }
            }
        }
    }

    fn generate_random_panel_fault<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        panel_index: usize,
    ) -> PanelFaultDescriptor {
        let idx = rng.random_range(0..PANEL_FAULTS.len());
        Self::describe_panel(rng, &PANEL_FAULTS[idx], panel_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn zero_probability_never_fires() {
        let mut rng = StdRng::seed_from_u64(1);
        let cat = FaultCatalogue::new();
        for _ in 0..1000 {
            assert!(cat.maybe_generate_fault(&mut rng, FaultCategory::Inverter, "INV-01", 0.0).is_none());
            assert!(cat.maybe_generate_panel_fault(&mut rng, 3, 0.0).is_none());
        }
    }

    #[test]
    fn certain_probability_always_fires() {
        let mut rng = StdRng::seed_from_u64(2);
        let cat = FaultCatalogue::new();
        for _ in 0..200 {
            let fault = cat
                .maybe_generate_fault(&mut rng, FaultCategory::Transformer, "TRF-01", 1.0)
                .unwrap();
            assert_eq!(fault.category, FaultCategory::Transformer);
            assert!(fault.code.starts_with("TRF_"));
            assert!(fault.message.starts_with("TRF-01"));
        }
    }

    #[test]
    fn panel_impact_stays_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(3);
        let cat = FaultCatalogue::new();
        for i in 0..500 {
            let fault = cat.generate_random_panel_fault(&mut rng, i);
            assert!(fault.performance_impact > 0.0 && fault.performance_impact <= 1.0);
            assert_eq!(fault.alert.category, FaultCategory::Panel);
        }
    }

    #[test]
    fn threshold_rule_is_deterministic() {
        let cat = FaultCatalogue::new();
        assert!(cat.check_performance_threshold(0.95).is_none());
        assert!(cat.check_performance_threshold(0.7).is_none());
        assert_eq!(cat.check_performance_threshold(0.65).unwrap().title, LOW_PERFORMANCE_TITLE);
        let critical = cat.check_performance_threshold(0.2).unwrap();
        assert_eq!(critical.title, CRITICAL_PERFORMANCE_TITLE);
        assert_eq!(critical.severity, AlarmSeverity::Critical);
        assert_eq!(critical.auto_clear_ms, SYSTEM_ALERT_CLEAR_MS);
    }

    #[test]
    fn every_inverter_code_is_reachable() {
        let mut rng = StdRng::seed_from_u64(4);
        let cat = FaultCatalogue::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(cat.generate_random_fault(&mut rng, FaultCategory::Inverter, "INV-02").code);
        }
        assert_eq!(seen.len(), INVERTER_FAULTS.len());
        assert!(seen.contains(INVERTER_THERMAL_CODE));
    }

    #[test]
    fn panel_and_system_categories_use_their_own_tables() {
        let mut rng = StdRng::seed_from_u64(5);
        let cat = FaultCatalogue::new();
        for _ in 0..50 {
            assert!(cat.generate_random_fault(&mut rng, FaultCategory::Panel, "PNL-7").code.starts_with("PNL_"));
            assert!(cat.generate_random_fault(&mut rng, FaultCategory::System, "PLANT").code.starts_with("SYS_"));
        }
    }
}
