pub mod fault_catalogue;
pub mod fault_registry;
pub mod irradiance;
pub mod simulator;
pub mod weather_fallback;
pub mod weather_service;
