pub mod config;
pub mod engine;
pub mod market_data;
pub mod persist;
pub mod telemetry;
