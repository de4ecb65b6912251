// externally visible interfaces
pub mod cycle;
pub mod device;
pub mod health;
pub mod home_assistant;
pub mod inverter;
pub mod metric_collector;
pub mod mqtt_config;
pub mod mqtt_wrapper;
pub mod reading;
pub mod reconnect;
pub mod scheduler;
pub mod telemetry;

// internal interfaces
mod home_assistant_config;
