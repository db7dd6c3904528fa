// Main entry point - Dependency injection and monitor lifecycle
use std::sync::Arc;

use anyhow::Context;
use room_monitor::RoomMonitor;
use room_monitor::infrastructure::config::load_monitor_settings;
use room_monitor::infrastructure::csv_source::CsvSampleSource;
use room_monitor::infrastructure::log_sinks::{LogAlarmSink, LogTelemetrySink};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "room_monitor=info".into()),
        )
        .init();

    // Load configuration
    let settings = load_monitor_settings().context("failed to load monitor settings")?;

    // Create adapters (infrastructure layer)
    let source = CsvSampleSource::open(&settings.sample_file).with_context(|| {
        format!("failed to load samples from {}", settings.sample_file.display())
    })?;

    // Create monitor (application layer)
    let monitor = RoomMonitor::builder()
        .module_id(settings.module_id.clone())
        .room_id(settings.room_id.clone())
        .source(Arc::new(source))
        .alarm_sink(Arc::new(LogAlarmSink))
        .telemetry_sink(Arc::new(LogTelemetrySink))
        .options(settings.options())
        .build()
        .context("failed to build room monitor")?;

    monitor.start()?;
    tracing::info!(
        module_id = %monitor.module_id(),
        room_id = %monitor.room_id(),
        hvac_device_id = %monitor.hvac_device_id(),
        "Monitoring, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    monitor.stop().await;
    Ok(())
}
