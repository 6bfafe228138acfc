use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use crate::config::SimulationConfigPatch;
use crate::models::telemetry::{
    Alert, ClearFaultsResponse, FaultCategory, OfflineModeBody, PlantSummary, TelemetrySnapshot,
};
use crate::shared_state::AppState;

fn error(status: StatusCode, message: impl std::fmt::Display) -> axum::response::Response {
    (status, Json(serde_json::json!({"error": message.to_string()}))).into_response()
}

fn not_found() -> axum::response::Response {
    error(StatusCode::NOT_FOUND, "Plant not found")
}

/// GET /api/plants
/// List all simulated plants
///
/// Returns every configured plant with its live configuration and currently active faults.
#[utoipa::path(
    get,
    path = "/api/plants",
    responses(
        (status = 200, description = "Simulated plants", body = Vec<PlantSummary>)
    )
)]
pub async fn list_plants(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.summaries()).into_response()
}

/// GET /api/plants/{id}/telemetry
/// Latest telemetry snapshot for a plant
#[utoipa::path(
    get,
    path = "/api/plants/{id}/telemetry",
    params(
        ("id" = String, Path, description = "Unique Plant ID")
    ),
    responses(
        (status = 200, description = "Latest snapshot", body = TelemetrySnapshot),
        (status = 204, description = "No cycle has completed yet"),
        (status = 404, description = "Plant not found")
    )
)]
pub async fn get_telemetry(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let Some(plant) = state.plant(&id) else {
        return not_found();
    };
    match plant.latest() {
        Some(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// GET /api/plants/{id}/alerts
/// Recent alerts for a plant, newest first
#[utoipa::path(
    get,
    path = "/api/plants/{id}/alerts",
    params(
        ("id" = String, Path, description = "Unique Plant ID")
    ),
    responses(
        (status = 200, description = "Recent alerts", body = Vec<Alert>),
        (status = 404, description = "Plant not found")
    )
)]
pub async fn get_alerts(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.plant(&id) {
        Some(plant) => Json(plant.recent_alerts()).into_response(),
        None => not_found(),
    }
}

/// POST /api/plants/{id}/faults/{category}
/// Inject a fault
///
/// Forces a fault onto the first healthy inverter or transformer, a random healthy
/// panel, or the plant itself. Returns 409 when every unit of the category is already faulted.
#[utoipa::path(
    post,
    path = "/api/plants/{id}/faults/{category}",
    params(
        ("id" = String, Path, description = "Unique Plant ID"),
        ("category" = String, Path, description = "inverter | transformer | panel | system")
    ),
    responses(
        (status = 201, description = "Fault injected", body = Alert),
        (status = 400, description = "Unknown category"),
        (status = 404, description = "Plant not found"),
        (status = 409, description = "Nothing left to fault")
    )
)]
pub async fn inject_fault(
    Path((id, category)): Path<(String, String)>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let Some(plant) = state.plant(&id) else {
        return not_found();
    };
    let category: FaultCategory = match category.parse() {
        Ok(c) => c,
        Err(e) => return error(StatusCode::BAD_REQUEST, e),
    };
    match plant.inject_fault(category) {
        Some(alert) => {
            info!(plant = %id, %category, code = %alert.code, "fault injected via API");
            (StatusCode::CREATED, Json(alert)).into_response()
        }
        None => error(StatusCode::CONFLICT, format!("every {} is already faulted", category)),
    }
}

/// DELETE /api/plants/{id}/faults
/// Clear every active fault and alert of a plant
#[utoipa::path(
    delete,
    path = "/api/plants/{id}/faults",
    params(
        ("id" = String, Path, description = "Unique Plant ID")
    ),
    responses(
        (status = 200, description = "Number of cleared entries", body = ClearFaultsResponse),
        (status = 404, description = "Plant not found")
    )
)]
pub async fn clear_faults(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.plant(&id) {
        Some(plant) => Json(ClearFaultsResponse { cleared: plant.clear_faults() }).into_response(),
        None => not_found(),
    }
}

/// DELETE /api/plants/{id}/faults/{category}/{key}
/// Clear a single fault
///
/// `key` is the equipment id for inverters and transformers (`INV-01`, `TRF-01`),
/// the panel index for panels and the alert title for system alerts.
/// Clearing something that is not active reports `cleared: 0`.
#[utoipa::path(
    delete,
    path = "/api/plants/{id}/faults/{category}/{key}",
    params(
        ("id" = String, Path, description = "Unique Plant ID"),
        ("category" = String, Path, description = "inverter | transformer | panel | system"),
        ("key" = String, Path, description = "Equipment id, panel index or alert title")
    ),
    responses(
        (status = 200, description = "Number of cleared entries", body = ClearFaultsResponse),
        (status = 400, description = "Unknown category or bad panel index"),
        (status = 404, description = "Plant not found")
    )
)]
pub async fn clear_fault(
    Path((id, category, key)): Path<(String, String, String)>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let Some(plant) = state.plant(&id) else {
        return not_found();
    };
    let category: FaultCategory = match category.parse() {
        Ok(c) => c,
        Err(e) => return error(StatusCode::BAD_REQUEST, e),
    };
    let cleared = match category {
        FaultCategory::Inverter | FaultCategory::Transformer => plant.clear_fault(&key),
        FaultCategory::Panel => match key.parse::<usize>() {
            Ok(index) => plant.clear_panel_fault(index),
            Err(_) => return error(StatusCode::BAD_REQUEST, format!("invalid panel index '{}'", key)),
        },
        FaultCategory::System => plant.clear_system_alert(&key),
    };
    if cleared {
        info!(plant = %id, %category, key = %key, "fault cleared via API");
    }
    Json(ClearFaultsResponse { cleared: usize::from(cleared) }).into_response()
}

/// PATCH /api/plants/{id}/config
/// Merge a partial simulation config
///
/// Only the supplied fields change; energy counters and active faults are kept.
/// The merged config must pass the same checks as `config.json`, otherwise
/// nothing changes and 400 is returned.
#[utoipa::path(
    patch,
    path = "/api/plants/{id}/config",
    params(
        ("id" = String, Path, description = "Unique Plant ID")
    ),
    request_body = SimulationConfigPatch,
    responses(
        (status = 200, description = "Updated plant", body = PlantSummary),
        (status = 400, description = "Patched config out of range"),
        (status = 404, description = "Plant not found")
    )
)]
pub async fn patch_config(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(patch): Json<SimulationConfigPatch>,
) -> impl IntoResponse {
    let Some(plant) = state.plant(&id) else {
        return not_found();
    };
    match plant.update_config(&patch) {
        Ok(()) => Json(plant.summary()).into_response(),
        Err(e) => error(StatusCode::BAD_REQUEST, e),
    }
}

/// GET /api/settings/offline-mode
#[utoipa::path(
    get,
    path = "/api/settings/offline-mode",
    responses(
        (status = 200, description = "Whether the live weather feed is bypassed", body = OfflineModeBody)
    )
)]
pub async fn get_offline_mode(State(state): State<AppState>) -> impl IntoResponse {
    Json(OfflineModeBody { enabled: state.weather.is_offline() })
}

/// POST /api/settings/offline-mode
#[utoipa::path(
    post,
    path = "/api/settings/offline-mode",
    request_body = OfflineModeBody,
    responses(
        (status = 200, description = "New setting", body = OfflineModeBody)
    )
)]
pub async fn set_offline_mode(
    State(state): State<AppState>,
    Json(body): Json<OfflineModeBody>,
) -> impl IntoResponse {
    state.weather.set_offline(body.enabled);
    info!(enabled = body.enabled, "offline weather mode changed");
    Json(OfflineModeBody { enabled: body.enabled })
}
