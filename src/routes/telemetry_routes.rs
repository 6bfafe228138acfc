use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use crate::controllers::telemetry_controller::{
    clear_fault, clear_faults, get_alerts, get_offline_mode, get_telemetry, inject_fault, list_plants,
    patch_config, set_offline_mode,
};
use crate::shared_state::AppState;

/// Build the `/api/*` sub-router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/plants",                       get(list_plants))
        .route("/plants/{id}/telemetry",        get(get_telemetry))
        .route("/plants/{id}/alerts",           get(get_alerts))
        .route("/plants/{id}/faults",           delete(clear_faults))
        .route("/plants/{id}/faults/{category}", post(inject_fault))
        .route("/plants/{id}/faults/{category}/{key}", delete(clear_fault))
        .route("/plants/{id}/config",           patch(patch_config))
        .route("/settings/offline-mode",        get(get_offline_mode).post(set_offline_mode))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::telemetry::FaultCategory;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state() -> AppState {
        let config = Config::from_json(
            r#"{
                "server": { "port": 0 },
                "weather": { "offline_mode": true },
                "plants": [
                    { "id": "boulder", "name": "Boulder", "capacity_kwp": 1000.0,
                      "latitude": 40.0, "longitude": -105.0, "enable_random_faults": false, "seed": 1 }
                ]
            }"#,
        )
        .unwrap();
        AppState::new(&config)
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<&str>) -> StatusCode {
        let mut req = Request::builder().method(method).uri(uri);
        if body.is_some() {
            req = req.header("content-type", "application/json");
        }
        let req = req.body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty)).unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn unknown_plant_is_404() {
        let app = api_routes(state());
        assert_eq!(send(app, "GET", "/plants/nope/alerts", None).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn telemetry_before_first_cycle_is_204() {
        let app = api_routes(state());
        assert_eq!(send(app, "GET", "/plants/boulder/telemetry", None).await, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn inject_then_exhaust_transformers() {
        let s = state();
        let created = send(api_routes(s.clone()), "POST", "/plants/boulder/faults/transformer", None).await;
        assert_eq!(created, StatusCode::CREATED);
        let conflict = send(api_routes(s.clone()), "POST", "/plants/boulder/faults/transformer", None).await;
        assert_eq!(conflict, StatusCode::CONFLICT);
        let bad = send(api_routes(s), "POST", "/plants/boulder/faults/battery", None).await;
        assert_eq!(bad, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn config_patch_is_applied() {
        let s = state();
        let status = send(
            api_routes(s.clone()),
            "PATCH",
            "/plants/boulder/config",
            Some(r#"{ "capacity_kwp": 1500.0 }"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(s.plant("boulder").unwrap().summary().capacity_kwp, 1500.0);
    }

    #[tokio::test]
    async fn out_of_range_patch_is_400_and_changes_nothing() {
        let s = state();
        let status = send(
            api_routes(s.clone()),
            "PATCH",
            "/plants/boulder/config",
            Some(r#"{ "latitude": 500, "capacity_kwp": -10, "fault_probability_per_cycle": 7, "soiling_loss": 3 }"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let summary = s.plant("boulder").unwrap().summary();
        assert_eq!(summary.latitude, 40.0);
        assert_eq!(summary.capacity_kwp, 1000.0);
    }

    #[tokio::test]
    async fn single_faults_can_be_cleared() {
        let s = state();
        let plant = s.plant("boulder").unwrap();
        plant.inject_fault(FaultCategory::Inverter).unwrap();
        let panel = plant.inject_fault(FaultCategory::Panel).unwrap();
        let system = plant.inject_fault(FaultCategory::System).unwrap();

        let ok = send(api_routes(s.clone()), "DELETE", "/plants/boulder/faults/inverter/INV-01", None).await;
        assert_eq!(ok, StatusCode::OK);
        let uri = format!("/plants/boulder/faults/panel/{}", panel.panel_index.unwrap());
        assert_eq!(send(api_routes(s.clone()), "DELETE", &uri, None).await, StatusCode::OK);
        let uri = format!("/plants/boulder/faults/system/{}", system.title.replace(' ', "%20"));
        assert_eq!(send(api_routes(s.clone()), "DELETE", &uri, None).await, StatusCode::OK);

        let summary = plant.summary();
        assert!(summary.active_faults.is_empty());
        assert!(summary.active_panel_faults.is_empty());
        assert!(summary.active_system_alerts.is_empty());

        let bad = send(api_routes(s), "DELETE", "/plants/boulder/faults/panel/abc", None).await;
        assert_eq!(bad, StatusCode::BAD_REQUEST);
    }
}
