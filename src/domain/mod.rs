// Domain layer - Data types and pure policy
pub mod alarm;
pub mod comfort;
pub mod command;
pub mod hvac;
pub mod reading;
pub mod telemetry;
