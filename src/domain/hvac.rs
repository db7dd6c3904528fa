// HVAC actuator domain model
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub const MIN_SETPOINT: f64 = 16.0;
pub const MAX_SETPOINT: f64 = 30.0;
pub const DEFAULT_SETPOINT: f64 = 22.0;

/// Temperature difference below which the actuator is considered idle.
const IDLE_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FanSpeed {
    Off,
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown fan speed: {0}")]
pub struct ParseFanSpeedError(pub String);

impl FromStr for FanSpeed {
    type Err = ParseFanSpeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(FanSpeed::Off),
            "low" => Ok(FanSpeed::Low),
            "medium" => Ok(FanSpeed::Medium),
            "high" => Ok(FanSpeed::High),
            _ => Err(ParseFanSpeedError(s.to_string())),
        }
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FanSpeed::Off => "Off",
            FanSpeed::Low => "Low",
            FanSpeed::Medium => "Medium",
            FanSpeed::High => "High",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HvacMode {
    Idle,
    Heating,
    Cooling,
}

impl HvacMode {
    /// Mode the actuator would be in for the given room temperature.
    pub fn derive(temperature: f64, setpoint: f64) -> Self {
        let delta = temperature - setpoint;
        if delta.abs() < IDLE_TOLERANCE {
            HvacMode::Idle
        } else if delta >= IDLE_TOLERANCE {
            HvacMode::Cooling
        } else {
            HvacMode::Heating
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HvacMode::Idle => "Idle",
            HvacMode::Heating => "Heating",
            HvacMode::Cooling => "Cooling",
        };
        f.write_str(name)
    }
}

/// Commanded actuator configuration. The mode is never stored; see [`HvacMode::derive`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HvacState {
    setpoint: f64,
    pub fan_speed: FanSpeed,
}

impl Default for HvacState {
    fn default() -> Self {
        Self {
            setpoint: DEFAULT_SETPOINT,
            fan_speed: FanSpeed::default(),
        }
    }
}

impl HvacState {
    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Update the setpoint, refusing values outside the actuator range.
    pub fn set_setpoint(&mut self, setpoint: f64) -> bool {
        if !is_valid_setpoint(setpoint) {
            return false;
        }
        self.setpoint = setpoint;
        true
    }

    pub fn mode(&self, temperature: f64) -> HvacMode {
        HvacMode::derive(temperature, self.setpoint)
    }
}

pub fn is_valid_setpoint(setpoint: f64) -> bool {
    (MIN_SETPOINT..=MAX_SETPOINT).contains(&setpoint)
}
