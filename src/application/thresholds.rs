// Threshold rules and alarm debouncing
use crate::domain::alarm::{AlarmCategory, Severity};
use crate::domain::reading::Reading;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(30);

const TEMPERATURE_LOW: f64 = 18.0;
const TEMPERATURE_HIGH: f64 = 26.0;
const HUMIDITY_LOW: f64 = 30.0;
const HUMIDITY_HIGH: f64 = 60.0;
const CO2_WARNING: f64 = 1000.0;
const CO2_CRITICAL: f64 = 1500.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdBreach {
    pub category: AlarmCategory,
    pub severity: Severity,
    pub message: String,
}

/// Check a reading against the comfort and safety limits.
///
/// Breaches are returned in evaluation order: temperature, humidity, CO2.
/// At most one CO2 breach is reported, critical taking precedence.
pub fn evaluate(reading: &Reading) -> Vec<ThresholdBreach> {
    let mut breaches = Vec::new();

    if reading.temperature < TEMPERATURE_LOW || reading.temperature > TEMPERATURE_HIGH {
        breaches.push(ThresholdBreach {
            category: AlarmCategory::Temperature,
            severity: Severity::Warning,
            message: format!(
                "Temperature out of range: {:.1}°C (allowed {}-{}°C)",
                reading.temperature, TEMPERATURE_LOW, TEMPERATURE_HIGH
            ),
        });
    }

    if reading.humidity < HUMIDITY_LOW || reading.humidity > HUMIDITY_HIGH {
        breaches.push(ThresholdBreach {
            category: AlarmCategory::Humidity,
            severity: Severity::Warning,
            message: format!(
                "Humidity out of range: {:.1}% (allowed {}-{}%)",
                reading.humidity, HUMIDITY_LOW, HUMIDITY_HIGH
            ),
        });
    }

    if reading.co2 > CO2_CRITICAL {
        breaches.push(ThresholdBreach {
            category: AlarmCategory::Co2,
            severity: Severity::Critical,
            message: format!("CO2 critical: {:.0} ppm (limit {} ppm)", reading.co2, CO2_CRITICAL),
        });
    } else if reading.co2 > CO2_WARNING {
        breaches.push(ThresholdBreach {
            category: AlarmCategory::Co2,
            severity: Severity::Warning,
            message: format!("CO2 elevated: {:.0} ppm (limit {} ppm)", reading.co2, CO2_WARNING),
        });
    }

    breaches
}

/// Remembers when each category was last forwarded.
///
/// Entries are never dropped when a condition recovers, so the window keeps
/// counting from the last forwarded raise.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_raised: HashMap<AlarmCategory, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_raised: HashMap::new(),
        }
    }

    /// Returns true and records `now` if `category` may be raised again.
    pub fn try_raise(&mut self, category: AlarmCategory, now: Instant) -> bool {
        match self.last_raised.get(&category) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                self.last_raised.insert(category, now);
                true
            }
        }
    }
}
