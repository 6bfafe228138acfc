mod routes;
mod controllers;
mod services;
mod models;
mod api_docs;
mod shared_state;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{Router, routing::get, response::Html};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_scalar::Scalar;

use crate::api_docs::ApiDoc;
use crate::config::Config;
use crate::models::telemetry::AlarmSeverity;
use crate::routes::telemetry_routes::api_routes;
use crate::shared_state::{AppState, PlantHandle};
use crate::services::weather_service::WeatherClient;

/// Drives one plant forever: weather, simulate, log, sleep.
async fn run_plant(handle: Arc<PlantHandle>, weather: WeatherClient, interval: Duration) {
    loop {
        let (lat, lon) = handle.location();
        let sample = weather.fetch_current_weather(lat, lon).await;
        match handle.tick(&sample) {
            Some((snapshot, alerts)) => {
                let m = &snapshot.system;
                info!(
                    plant = %handle.plant.id,
                    actual_kw = %format!("{:.1}", m.actual_power_kw),
                    expected_kw = %format!("{:.1}", m.expected_power_kw),
                    pr = %format!("{:.3}", m.performance_ratio),
                    ghi = %format!("{:.0}", m.irradiance_w_m2),
                    faults = m.active_fault_count,
                    "cycle"
                );
                for alert in alerts {
                    match alert.severity {
                        AlarmSeverity::Info => info!(plant = %handle.plant.id, code = %alert.code, "{}", alert.title),
                        _ => warn!(
                            plant = %handle.plant.id,
                            code = %alert.code,
                            severity = ?alert.severity,
                            equipment = alert.equipment_id.as_deref().unwrap_or("-"),
                            "{}",
                            alert.title
                        ),
                    }
                }
            }
            None => warn!(plant = %handle.plant.id, "simulator lock poisoned, skipping cycle"),
        }
        tokio::time::sleep(interval).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer())
        .init();

    // 1. Load configuration
    let path = std::env::var("PV_TWIN_CONFIG").unwrap_or_else(|_| "config.json".to_string());
    let config = Config::load(&path).with_context(|| format!("failed to load {}", path))?;
    info!(plants = config.plants.len(), path = %path, "configuration loaded");

    // 2. Initialize shared state
    let state = AppState::new(&config);

    // 3. One simulation task per plant
    let interval = Duration::from_secs(config.update_interval_s.max(1));
    for handle in state.plants.values() {
        tokio::spawn(run_plant(handle.clone(), state.weather.clone(), interval));
    }

    // 4. Start Axum HTTP server
    let app = Router::new()
        .nest("/api", api_routes(state.clone()))
        .route("/scalar", get(|| async {
            Html(Scalar::new(ApiDoc::openapi()).to_html())
        }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("API server listening on http://{}", addr);
    info!("Scalar UI: http://{}/scalar", addr);

    axum_server::bind(addr)
        .serve(app.into_make_service())
        .await
        .context("http server terminated")?;
    Ok(())
}
