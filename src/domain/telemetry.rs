// Published telemetry domain models
use super::hvac::{FanSpeed, HvacMode};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryPoint {
    pub device_id: String,
    pub metric: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryPoint {
    pub fn new(
        device_id: String,
        metric: &str,
        value: f64,
        unit: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id,
            metric: metric.to_string(),
            value,
            unit: unit.to_string(),
            timestamp,
        }
    }
}

/// Snapshot of the HVAC actuator as seen by consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub device_id: String,
    pub setpoint: f64,
    pub fan_speed: FanSpeed,
    /// `None` until the first reading has been taken.
    pub current_temperature: Option<f64>,
    pub mode: HvacMode,
    pub timestamp: DateTime<Utc>,
}
