use crate::application::room_monitor::MonitorOptions;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MonitorSettings {
    pub module_id: String,
    pub room_id: String,
    pub sample_file: PathBuf,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_debounce_secs() -> u64 {
    30
}

fn default_stop_grace_ms() -> u64 {
    5000
}

impl MonitorSettings {
    pub fn options(&self) -> MonitorOptions {
        MonitorOptions {
            interval: Duration::from_millis(self.interval_ms),
            debounce_window: Duration::from_secs(self.debounce_secs),
            stop_grace: Duration::from_millis(self.stop_grace_ms),
        }
    }
}

/// Load settings from `config/monitor` (any supported format, optional)
/// overlaid with `MONITOR__*` environment variables.
pub fn load_monitor_settings() -> anyhow::Result<MonitorSettings> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/monitor").required(false))
        .add_source(config::Environment::with_prefix("MONITOR").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_map_to_reference_options() {
        let settings: MonitorSettings = config::Config::builder()
            .set_override("module_id", "monitor-1")
            .unwrap()
            .set_override("room_id", "lab")
            .unwrap()
            .set_override("sample_file", "data/samples.csv")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.room_id, "lab");
        assert_eq!(settings.options(), MonitorOptions::default());
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let settings: MonitorSettings = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
module_id = "monitor-2"
room_id = "office"
sample_file = "office.csv"
interval_ms = 500
debounce_secs = 10
"#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let options = settings.options();
        assert_eq!(options.interval, Duration::from_millis(500));
        assert_eq!(options.debounce_window, Duration::from_secs(10));
        assert_eq!(options.stop_grace, Duration::from_millis(5000));
    }
}
