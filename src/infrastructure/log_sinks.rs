// Tracing-backed alarm and telemetry sinks
use crate::application::sinks::{AlarmSink, TelemetrySink};
use crate::domain::alarm::{AlarmEvent, Severity};
use crate::domain::telemetry::{DeviceState, TelemetryPoint};
use anyhow::Context;
use async_trait::async_trait;

/// Writes alarms to the log, at a level matching their severity.
#[derive(Debug, Clone, Default)]
pub struct LogAlarmSink;

#[async_trait]
impl AlarmSink for LogAlarmSink {
    async fn raise(&self, alarm: AlarmEvent) -> anyhow::Result<()> {
        match alarm.severity {
            Severity::Info => tracing::info!(
                alarm_id = %alarm.id,
                device_id = %alarm.device_id,
                severity = %alarm.severity,
                "ALARM {}",
                alarm.message
            ),
            Severity::Warning => tracing::warn!(
                alarm_id = %alarm.id,
                device_id = %alarm.device_id,
                severity = %alarm.severity,
                "ALARM {}",
                alarm.message
            ),
            Severity::Critical => tracing::error!(
                alarm_id = %alarm.id,
                device_id = %alarm.device_id,
                severity = %alarm.severity,
                "ALARM {}",
                alarm.message
            ),
        }
        Ok(())
    }

    async fn clear(&self, alarm_id: &str) -> anyhow::Result<()> {
        tracing::info!(alarm_id, "ALARM cleared");
        Ok(())
    }
}

/// Writes telemetry to the log; device snapshots are emitted as JSON.
#[derive(Debug, Clone, Default)]
pub struct LogTelemetrySink;

#[async_trait]
impl TelemetrySink for LogTelemetrySink {
    async fn publish_point(&self, point: TelemetryPoint) -> anyhow::Result<()> {
        tracing::info!(
            device_id = %point.device_id,
            metric = %point.metric,
            value = point.value,
            unit = %point.unit,
            "telemetry"
        );
        Ok(())
    }

    async fn publish_state(&self, state: DeviceState) -> anyhow::Result<()> {
        let json = serde_json::to_string(&state).context("Failed to serialize device state")?;
        tracing::info!(device_id = %state.device_id, state = %json, "device state");
        Ok(())
    }
}
