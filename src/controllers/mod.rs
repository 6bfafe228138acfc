pub mod telemetry_controller;
