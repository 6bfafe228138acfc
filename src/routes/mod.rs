pub mod telemetry_routes;
