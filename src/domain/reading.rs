// Sensor reading domain model
use chrono::NaiveDateTime;

/// One environmental sample for a room.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub room_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub co2: f64,
}

impl Reading {
    pub fn new(
        timestamp: NaiveDateTime,
        room_id: String,
        temperature: f64,
        humidity: f64,
        co2: f64,
    ) -> Self {
        Self {
            timestamp,
            room_id,
            temperature,
            humidity,
            co2,
        }
    }
}
