// Operator commands addressed to the HVAC actuator
use crate::error::MonitorError;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawCommand")]
pub struct Command {
    pub target_id: String,
    pub correlation_id: String,
    pub action: CommandAction,
}

/// Typed form of a command verb and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandAction {
    SetTemperature { setpoint: f64 },
    /// The speed stays textual so the monitor can report unparseable values.
    SetFanSpeed { speed: String },
    Unknown { verb: String },
}

impl CommandAction {
    pub fn verb(&self) -> &str {
        match self {
            CommandAction::SetTemperature { .. } => "SetTemperature",
            CommandAction::SetFanSpeed { .. } => "SetFanSpeed",
            CommandAction::Unknown { verb } => verb,
        }
    }
}

/// Wire shape: a verb plus an untyped argument bag.
#[derive(Debug, Deserialize)]
struct RawCommand {
    target_id: String,
    verb: String,
    #[serde(default)]
    args: Map<String, Value>,
    #[serde(default)]
    correlation_id: String,
}

impl TryFrom<RawCommand> for Command {
    type Error = MonitorError;

    fn try_from(raw: RawCommand) -> Result<Self, Self::Error> {
        Command::from_parts(raw.target_id, &raw.verb, &raw.args, raw.correlation_id)
    }
}

impl Command {
    pub fn new(target_id: impl Into<String>, action: CommandAction) -> Self {
        Self {
            target_id: target_id.into(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
            action,
        }
    }

    /// Validate an untyped verb/argument bag into a typed command.
    ///
    /// Fails with `InvalidArgument` when a known verb is missing its argument
    /// or the argument has the wrong type. Unknown verbs are accepted and
    /// ignored later by the monitor.
    pub fn from_parts(
        target_id: String,
        verb: &str,
        args: &Map<String, Value>,
        correlation_id: String,
    ) -> Result<Self, MonitorError> {
        let action = match verb {
            "SetTemperature" => {
                let setpoint = args.get("setpoint").and_then(Value::as_f64).ok_or_else(|| {
                    MonitorError::InvalidArgument(
                        "SetTemperature requires a numeric 'setpoint'".to_string(),
                    )
                })?;
                CommandAction::SetTemperature { setpoint }
            }
            "SetFanSpeed" => {
                let speed = args.get("speed").and_then(Value::as_str).ok_or_else(|| {
                    MonitorError::InvalidArgument("SetFanSpeed requires a string 'speed'".to_string())
                })?;
                CommandAction::SetFanSpeed {
                    speed: speed.to_string(),
                }
            }
            other => CommandAction::Unknown {
                verb: other.to_string(),
            },
        };

        Ok(Self {
            target_id,
            correlation_id,
            action,
        })
    }
}
