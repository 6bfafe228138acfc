use utoipa::OpenApi;
use crate::controllers::telemetry_controller;
use crate::models::telemetry;
use crate::config;

#[derive(OpenApi)]
#[openapi(
    paths(
        telemetry_controller::list_plants,
        telemetry_controller::get_telemetry,
        telemetry_controller::get_alerts,
        telemetry_controller::inject_fault,
        telemetry_controller::clear_faults,
        telemetry_controller::clear_fault,
        telemetry_controller::patch_config,
        telemetry_controller::get_offline_mode,
        telemetry_controller::set_offline_mode
    ),
    components(
        schemas(
            telemetry::TelemetrySnapshot,
            telemetry::SystemMetrics,
            telemetry::InverterReading,
            telemetry::TransformerReading,
            telemetry::PanelReading,
            telemetry::WeatherSample,
            telemetry::Alert,
            telemetry::PlantSummary,
            telemetry::OfflineModeBody,
            telemetry::ClearFaultsResponse,
            config::SimulationConfig,
            config::SimulationConfigPatch
        )
    ),
    tags(
        (name = "pv-twin-sim", description = "PV Plant Digital Twin Telemetry API")
    )
)]
pub struct ApiDoc;
