// Alarm domain model
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Critical => "Critical",
        };
        f.write_str(name)
    }
}

/// Environmental condition an alarm is debounced under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmCategory {
    Temperature,
    Humidity,
    Co2,
}

impl AlarmCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmCategory::Temperature => "Temperature",
            AlarmCategory::Humidity => "Humidity",
            AlarmCategory::Co2 => "CO2",
        }
    }
}

impl fmt::Display for AlarmCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmEvent {
    pub id: String,
    pub device_id: String,
    pub severity: Severity,
    pub message: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl AlarmEvent {
    /// New open alarm with a freshly generated id.
    pub fn new(device_id: String, severity: Severity, message: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            device_id,
            severity,
            message,
            start_time: Utc::now(),
            end_time: None,
        }
    }
}
