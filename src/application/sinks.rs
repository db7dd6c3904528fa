// Ports for alarm and telemetry consumers
use crate::domain::alarm::AlarmEvent;
use crate::domain::telemetry::{DeviceState, TelemetryPoint};
use async_trait::async_trait;

/// Receives raised and cleared alarms. Errors are logged by the caller and
/// never retried.
#[async_trait]
pub trait AlarmSink: Send + Sync {
    async fn raise(&self, alarm: AlarmEvent) -> anyhow::Result<()>;

    async fn clear(&self, alarm_id: &str) -> anyhow::Result<()>;
}

/// Receives metric points and device snapshots.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn publish_point(&self, point: TelemetryPoint) -> anyhow::Result<()>;

    async fn publish_state(&self, state: DeviceState) -> anyhow::Result<()>;
}
