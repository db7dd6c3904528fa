// Room monitor - Periodic sample/evaluate/publish loop plus HVAC commands
use crate::application::sample_source::SampleSource;
use crate::application::sinks::{AlarmSink, TelemetrySink};
use crate::application::thresholds::{self, DEFAULT_DEBOUNCE_WINDOW, Debouncer};
use crate::domain::alarm::{AlarmEvent, Severity};
use crate::domain::comfort;
use crate::domain::command::{Command, CommandAction};
use crate::domain::hvac::{FanSpeed, HvacMode, HvacState, MAX_SETPOINT, MIN_SETPOINT};
use crate::domain::reading::Reading;
use crate::domain::telemetry::{DeviceState, TelemetryPoint};
use crate::error::{MonitorError, Result};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorOptions {
    /// Time between the start of consecutive cycles.
    pub interval: Duration,
    /// Minimum time between two forwarded alarms of the same category.
    pub debounce_window: Duration,
    /// How long `stop` waits for an in-flight cycle.
    pub stop_grace: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

/// Everything a cycle or command may read-modify-write. Guarded by one lock
/// so a snapshot never mixes a new setpoint with a stale reading.
#[derive(Debug)]
struct MonitorState {
    last_reading: Option<Reading>,
    comfort_score: Option<f64>,
    hvac: HvacState,
    debouncer: Debouncer,
}

/// Work produced under the state lock and dispatched after releasing it.
struct CycleOutput {
    alarms: Vec<AlarmEvent>,
    points: Vec<TelemetryPoint>,
    state: DeviceState,
}

struct MonitorInner {
    module_id: String,
    room_id: String,
    hvac_device_id: String,
    source: Arc<dyn SampleSource>,
    alarms: Arc<dyn AlarmSink>,
    telemetry: Arc<dyn TelemetrySink>,
    options: MonitorOptions,
    state: Mutex<MonitorState>,
}

struct Runner {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Lifecycle of the background task. `Stopping` covers the grace period in
/// which the old loop may still be finishing a cycle.
enum RunnerSlot {
    Idle,
    Running(Runner),
    Stopping,
}

/// Monitors one room: samples the source on a fixed interval, scores and
/// evaluates each reading, publishes telemetry, and applies HVAC commands.
pub struct RoomMonitor {
    inner: Arc<MonitorInner>,
    runner: Mutex<RunnerSlot>,
}

#[derive(Default)]
pub struct RoomMonitorBuilder {
    module_id: Option<String>,
    room_id: Option<String>,
    source: Option<Arc<dyn SampleSource>>,
    alarms: Option<Arc<dyn AlarmSink>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    options: MonitorOptions,
}

impl RoomMonitorBuilder {
    pub fn module_id(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    pub fn room_id(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn source(mut self, source: Arc<dyn SampleSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn alarm_sink(mut self, alarms: Arc<dyn AlarmSink>) -> Self {
        self.alarms = Some(alarms);
        self
    }

    pub fn telemetry_sink(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn options(mut self, options: MonitorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<RoomMonitor> {
        let module_id = self
            .module_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(MonitorError::ArgumentMissing("module_id"))?;
        let room_id = self
            .room_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(MonitorError::ArgumentMissing("room_id"))?;
        let source = self.source.ok_or(MonitorError::ArgumentMissing("source"))?;
        let alarms = self.alarms.ok_or(MonitorError::ArgumentMissing("alarm_sink"))?;
        let telemetry = self
            .telemetry
            .ok_or(MonitorError::ArgumentMissing("telemetry_sink"))?;
        if self.options.interval.is_zero() {
            return Err(MonitorError::InvalidArgument(
                "cycle interval must be greater than zero".to_string(),
            ));
        }

        let state = MonitorState {
            last_reading: None,
            comfort_score: None,
            hvac: HvacState::default(),
            debouncer: Debouncer::new(self.options.debounce_window),
        };

        Ok(RoomMonitor {
            inner: Arc::new(MonitorInner {
                hvac_device_id: format!("{}_HVAC", room_id),
                module_id,
                room_id,
                source,
                alarms,
                telemetry,
                options: self.options,
                state: Mutex::new(state),
            }),
            runner: Mutex::new(RunnerSlot::Idle),
        })
    }
}

impl RoomMonitor {
    pub fn builder() -> RoomMonitorBuilder {
        RoomMonitorBuilder::default()
    }

    pub fn new(
        module_id: impl Into<String>,
        room_id: impl Into<String>,
        source: Arc<dyn SampleSource>,
        alarms: Arc<dyn AlarmSink>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self> {
        Self::builder()
            .module_id(module_id)
            .room_id(room_id)
            .source(source)
            .alarm_sink(alarms)
            .telemetry_sink(telemetry)
            .build()
    }

    pub fn module_id(&self) -> &str {
        &self.inner.module_id
    }

    pub fn room_id(&self) -> &str {
        &self.inner.room_id
    }

    pub fn hvac_device_id(&self) -> &str {
        &self.inner.hvac_device_id
    }

    /// Begin the periodic cycle on a background task.
    ///
    /// Must be called from within a tokio runtime. Calling it while the
    /// monitor is already running does nothing; calling it while a `stop`
    /// is still waiting for the previous loop fails with `InvalidState`.
    pub fn start(&self) -> Result<()> {
        if !self.inner.source.is_initialized() {
            return Err(MonitorError::InvalidState(
                "sample source is not initialized".to_string(),
            ));
        }

        let mut runner = lock(&self.runner);
        match &*runner {
            RunnerSlot::Running(existing) if !existing.handle.is_finished() => {
                tracing::debug!(room_id = %self.inner.room_id, "Monitor already running");
                return Ok(());
            }
            RunnerSlot::Stopping => {
                return Err(MonitorError::InvalidState(
                    "monitor is still stopping".to_string(),
                ));
            }
            _ => {}
        }

        let cancel = CancellationToken::new();
        let inner = self.inner.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { inner.run(token).await });

        tracing::info!(
            module_id = %self.inner.module_id,
            room_id = %self.inner.room_id,
            interval_ms = self.inner.options.interval.as_millis() as u64,
            "Room monitor started"
        );

        *runner = RunnerSlot::Running(Runner { cancel, handle });
        Ok(())
    }

    /// Signal the loop to exit and wait (bounded) for the in-flight cycle.
    ///
    /// Does nothing if the monitor is not running.
    pub async fn stop(&self) {
        let runner = {
            let mut slot = lock(&self.runner);
            match std::mem::replace(&mut *slot, RunnerSlot::Stopping) {
                RunnerSlot::Running(runner) => runner,
                other => {
                    *slot = other;
                    return;
                }
            }
        };
        let mut runner = runner;

        runner.cancel.cancel();
        let grace = self.inner.options.stop_grace;
        match tokio::time::timeout(grace, &mut runner.handle).await {
            Ok(Ok(())) => {
                tracing::info!(room_id = %self.inner.room_id, "Room monitor stopped");
            }
            Ok(Err(e)) => {
                tracing::error!(room_id = %self.inner.room_id, error = %e, "Monitor task ended abnormally");
            }
            Err(_) => {
                tracing::warn!(
                    room_id = %self.inner.room_id,
                    grace_ms = grace.as_millis() as u64,
                    "Monitor cycle did not finish within grace period, aborting"
                );
                runner.handle.abort();
            }
        }

        *lock(&self.runner) = RunnerSlot::Idle;
    }

    pub fn is_running(&self) -> bool {
        matches!(&*lock(&self.runner), RunnerSlot::Running(runner) if !runner.handle.is_finished())
    }

    /// Run a single sample/evaluate/publish cycle immediately.
    pub async fn run_cycle(&self) {
        self.inner.run_cycle().await;
    }

    /// Apply an operator command.
    ///
    /// Commands for other devices are ignored. Malformed fan speeds are
    /// returned to the caller; out-of-range setpoints and failures while
    /// applying the command are reported as a warning alarm instead.
    pub async fn process_command(&self, command: Command) -> Result<()> {
        let verb = command.action.verb().to_string();
        match AssertUnwindSafe(self.inner.process_command(command))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!(device_id = %self.inner.hvac_device_id, verb = %verb, reason = %reason, "Command panicked");
                self.inner
                    .raise(AlarmEvent::new(
                        self.inner.hvac_device_id.clone(),
                        Severity::Warning,
                        format!("Command {} failed: {}", verb, reason),
                    ))
                    .await;
                Ok(())
            }
        }
    }

    /// Forward an explicit clear for a previously raised alarm.
    pub async fn clear_alarm(&self, alarm_id: &str) {
        if let Err(e) = self.inner.alarms.clear(alarm_id).await {
            tracing::warn!(alarm_id, error = %e, "Failed to clear alarm");
        }
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.inner
            .lock_state()
            .last_reading
            .as_ref()
            .map(|r| r.temperature)
    }

    pub fn comfort_score(&self) -> Option<f64> {
        self.inner.lock_state().comfort_score
    }

    pub fn setpoint(&self) -> f64 {
        self.inner.lock_state().hvac.setpoint()
    }

    pub fn fan_speed(&self) -> FanSpeed {
        self.inner.lock_state().hvac.fan_speed
    }

    pub fn hvac_mode(&self) -> HvacMode {
        let state = self.inner.lock_state();
        self.inner.device_state(&state).mode
    }

    /// Consistent HVAC snapshot taken under a single lock.
    pub fn snapshot(&self) -> DeviceState {
        let state = self.inner.lock_state();
        self.inner.device_state(&state)
    }
}

impl Drop for RoomMonitor {
    fn drop(&mut self) {
        if let RunnerSlot::Running(runner) = &*lock(&self.runner) {
            runner.cancel.cancel();
        }
    }
}

impl MonitorInner {
    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        lock(&self.state)
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(panic) = AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                        tracing::error!(
                            room_id = %self.room_id,
                            reason = %panic_message(panic.as_ref()),
                            "Monitor cycle panicked, continuing with next cycle"
                        );
                    }
                }
            }
        }

        tracing::debug!(room_id = %self.room_id, "Monitor loop exited");
    }

    async fn run_cycle(&self) {
        let output = self.evaluate_cycle();

        tracing::debug!(
            room_id = %self.room_id,
            alarms = output.alarms.len(),
            points = output.points.len(),
            mode = %output.state.mode,
            "Monitor cycle complete"
        );

        for alarm in output.alarms {
            self.raise(alarm).await;
        }
        for point in output.points {
            let metric = point.metric.clone();
            if let Err(e) = self.telemetry.publish_point(point).await {
                tracing::warn!(room_id = %self.room_id, metric = %metric, error = %e, "Failed to publish telemetry point");
            }
        }
        if let Err(e) = self.telemetry.publish_state(output.state).await {
            tracing::warn!(device_id = %self.hvac_device_id, error = %e, "Failed to publish device state");
        }
    }

    /// Steps 1-4 of a cycle, performed under the state lock.
    fn evaluate_cycle(&self) -> CycleOutput {
        let mut state = self.lock_state();

        match self.source.next_reading() {
            Ok(reading) => {
                state.comfort_score = Some(comfort::score(
                    reading.temperature,
                    reading.humidity,
                    reading.co2,
                ));
                state.last_reading = Some(reading);
            }
            Err(e) => {
                tracing::warn!(room_id = %self.room_id, error = %e, "Failed to pull sample, keeping previous values");
            }
        }

        let mut alarms = Vec::new();
        let mut points = Vec::new();
        let now = Utc::now();

        if let Some(reading) = state.last_reading.clone() {
            let evaluated_at = Instant::now();
            for breach in thresholds::evaluate(&reading) {
                if state.debouncer.try_raise(breach.category, evaluated_at) {
                    alarms.push(AlarmEvent::new(
                        self.sensor_device_id(breach.category.as_str()),
                        breach.severity,
                        breach.message,
                    ));
                } else {
                    tracing::trace!(key = %breach.category, "Alarm suppressed by debounce");
                }
            }

            points.push(TelemetryPoint::new(
                self.sensor_device_id("Temperature"),
                "Temperature",
                reading.temperature,
                "°C",
                now,
            ));
            points.push(TelemetryPoint::new(
                self.sensor_device_id("Humidity"),
                "Humidity",
                reading.humidity,
                "%",
                now,
            ));
            points.push(TelemetryPoint::new(
                self.sensor_device_id("CO2"),
                "CO2",
                reading.co2,
                "ppm",
                now,
            ));
            if let Some(score) = state.comfort_score {
                points.push(TelemetryPoint::new(
                    self.sensor_device_id("ComfortScore"),
                    "ComfortScore",
                    score,
                    "score",
                    now,
                ));
            }
            points.push(TelemetryPoint::new(
                self.hvac_device_id.clone(),
                "Setpoint",
                state.hvac.setpoint(),
                "°C",
                now,
            ));
        }

        CycleOutput {
            alarms,
            points,
            state: self.device_state(&state),
        }
    }

    async fn process_command(&self, command: Command) -> Result<()> {
        if command.target_id != self.hvac_device_id {
            tracing::debug!(
                target_id = %command.target_id,
                device_id = %self.hvac_device_id,
                "Ignoring command for another device"
            );
            return Ok(());
        }

        let verb = command.action.verb().to_string();
        tracing::info!(
            device_id = %self.hvac_device_id,
            verb = %verb,
            correlation_id = %command.correlation_id,
            "Processing command"
        );

        match command.action {
            CommandAction::SetTemperature { setpoint } => {
                let applied = {
                    let mut state = self.lock_state();
                    if state.hvac.set_setpoint(setpoint) {
                        Some(self.device_state(&state))
                    } else {
                        None
                    }
                };

                match applied {
                    Some(snapshot) => self.publish_command_state(&verb, snapshot).await,
                    None => {
                        tracing::warn!(device_id = %self.hvac_device_id, setpoint, "Rejected out-of-range setpoint");
                        self.raise(AlarmEvent::new(
                            self.hvac_device_id.clone(),
                            Severity::Warning,
                            format!(
                                "Invalid setpoint: {} (allowed {}-{}°C)",
                                setpoint, MIN_SETPOINT, MAX_SETPOINT
                            ),
                        ))
                        .await;
                    }
                }
                Ok(())
            }
            CommandAction::SetFanSpeed { speed } => {
                let fan_speed: FanSpeed = speed.parse().map_err(|e| {
                    tracing::warn!(device_id = %self.hvac_device_id, speed = %speed, "Rejected fan speed");
                    MonitorError::InvalidArgument(format!("{}", e))
                })?;

                let snapshot = {
                    let mut state = self.lock_state();
                    state.hvac.fan_speed = fan_speed;
                    self.device_state(&state)
                };
                self.publish_command_state(&verb, snapshot).await;
                Ok(())
            }
            CommandAction::Unknown { verb } => {
                tracing::warn!(device_id = %self.hvac_device_id, verb = %verb, "Unknown command verb, ignoring");
                Ok(())
            }
        }
    }

    /// Publish the out-of-cycle snapshot after a command; a failure is
    /// surfaced to operators as a warning alarm.
    async fn publish_command_state(&self, verb: &str, snapshot: DeviceState) {
        if let Err(e) = self.telemetry.publish_state(snapshot).await {
            tracing::warn!(device_id = %self.hvac_device_id, verb, error = %e, "Command state publish failed");
            self.raise(AlarmEvent::new(
                self.hvac_device_id.clone(),
                Severity::Warning,
                format!("Command {} failed: {}", verb, e),
            ))
            .await;
        }
    }

    async fn raise(&self, alarm: AlarmEvent) {
        let alarm_id = alarm.id.clone();
        if let Err(e) = self.alarms.raise(alarm).await {
            tracing::warn!(alarm_id = %alarm_id, error = %e, "Failed to raise alarm");
        }
    }

    fn device_state(&self, state: &MonitorState) -> DeviceState {
        let temperature = state.last_reading.as_ref().map(|r| r.temperature);
        DeviceState {
            device_id: self.hvac_device_id.clone(),
            setpoint: state.hvac.setpoint(),
            fan_speed: state.hvac.fan_speed,
            current_temperature: temperature,
            mode: temperature
                .map(|t| state.hvac.mode(t))
                .unwrap_or(HvacMode::Idle),
            timestamp: Utc::now(),
        }
    }

    fn sensor_device_id(&self, sensor: &str) -> String {
        format!("{}_{}", self.room_id, sensor)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Locks ignore poisoning: state is only replaced wholesale, never left
/// half-written by a panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hvac::DEFAULT_SETPOINT;
    use async_trait::async_trait;

    struct FixedSource {
        initialized: bool,
        reading: Mutex<Option<Reading>>,
    }

    impl FixedSource {
        fn new(temperature: f64, humidity: f64, co2: f64) -> Arc<Self> {
            Arc::new(Self {
                initialized: true,
                reading: Mutex::new(Some(reading(temperature, humidity, co2))),
            })
        }

        fn uninitialized() -> Arc<Self> {
            Arc::new(Self {
                initialized: false,
                reading: Mutex::new(None),
            })
        }

        fn set(&self, reading: Option<Reading>) {
            *self.reading.lock().unwrap() = reading;
        }
    }

    impl SampleSource for FixedSource {
        fn is_initialized(&self) -> bool {
            self.initialized
        }

        fn next_reading(&self) -> anyhow::Result<Reading> {
            self.reading
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| anyhow::anyhow!("sensor offline"))
        }
    }

    #[derive(Default)]
    struct RecordingAlarms {
        raised: Mutex<Vec<AlarmEvent>>,
        cleared: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl AlarmSink for RecordingAlarms {
        async fn raise(&self, alarm: AlarmEvent) -> anyhow::Result<()> {
            self.raised.lock().unwrap().push(alarm);
            if self.fail {
                anyhow::bail!("alarm bus down");
            }
            Ok(())
        }

        async fn clear(&self, alarm_id: &str) -> anyhow::Result<()> {
            self.cleared.lock().unwrap().push(alarm_id.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTelemetry {
        points: Mutex<Vec<TelemetryPoint>>,
        states: Mutex<Vec<DeviceState>>,
        fail: bool,
        panic_on_point: bool,
        panic_on_state: bool,
        state_delay: Option<Duration>,
    }

    #[async_trait]
    impl TelemetrySink for RecordingTelemetry {
        async fn publish_point(&self, point: TelemetryPoint) -> anyhow::Result<()> {
            self.points.lock().unwrap().push(point);
            if self.panic_on_point {
                panic!("point encoder crashed");
            }
            if self.fail {
                anyhow::bail!("telemetry bus down");
            }
            Ok(())
        }

        async fn publish_state(&self, state: DeviceState) -> anyhow::Result<()> {
            if let Some(delay) = self.state_delay {
                tokio::time::sleep(delay).await;
            }
            self.states.lock().unwrap().push(state);
            if self.panic_on_state {
                panic!("state encoder crashed");
            }
            if self.fail {
                anyhow::bail!("telemetry bus down");
            }
            Ok(())
        }
    }

    impl RecordingAlarms {
        fn count(&self) -> usize {
            self.raised.lock().unwrap().len()
        }
    }

    impl RecordingTelemetry {
        fn state_count(&self) -> usize {
            self.states.lock().unwrap().len()
        }
    }

    fn reading(temperature: f64, humidity: f64, co2: f64) -> Reading {
        Reading::new(
            Utc::now().naive_utc(),
            "lab".to_string(),
            temperature,
            humidity,
            co2,
        )
    }

    struct Harness {
        monitor: RoomMonitor,
        source: Arc<FixedSource>,
        alarms: Arc<RecordingAlarms>,
        telemetry: Arc<RecordingTelemetry>,
    }

    fn harness_with(
        source: Arc<FixedSource>,
        alarms: RecordingAlarms,
        telemetry: RecordingTelemetry,
        options: MonitorOptions,
    ) -> Harness {
        let alarms = Arc::new(alarms);
        let telemetry = Arc::new(telemetry);
        let monitor = RoomMonitor::builder()
            .module_id("monitor-1")
            .room_id("lab")
            .source(source.clone())
            .alarm_sink(alarms.clone())
            .telemetry_sink(telemetry.clone())
            .options(options)
            .build()
            .unwrap();
        Harness {
            monitor,
            source,
            alarms,
            telemetry,
        }
    }

    fn harness(temperature: f64, humidity: f64, co2: f64) -> Harness {
        harness_with(
            FixedSource::new(temperature, humidity, co2),
            RecordingAlarms::default(),
            RecordingTelemetry::default(),
            MonitorOptions::default(),
        )
    }

    fn set_temperature(target: &str, setpoint: f64) -> Command {
        Command::new(target, CommandAction::SetTemperature { setpoint })
    }

    fn set_fan_speed(target: &str, speed: &str) -> Command {
        Command::new(
            target,
            CommandAction::SetFanSpeed {
                speed: speed.to_string(),
            },
        )
    }

    #[test]
    fn test_builder_requires_arguments() {
        let alarms: Arc<dyn AlarmSink> = Arc::new(RecordingAlarms::default());
        let telemetry: Arc<dyn TelemetrySink> = Arc::new(RecordingTelemetry::default());
        let source: Arc<dyn SampleSource> = FixedSource::new(22.0, 45.0, 500.0);

        let result = RoomMonitor::new("", "lab", source.clone(), alarms.clone(), telemetry.clone());
        assert!(matches!(result, Err(MonitorError::ArgumentMissing("module_id"))));

        let result = RoomMonitor::new("m", "  ", source.clone(), alarms.clone(), telemetry.clone());
        assert!(matches!(result, Err(MonitorError::ArgumentMissing("room_id"))));

        let result = RoomMonitor::builder()
            .module_id("m")
            .room_id("lab")
            .source(source)
            .telemetry_sink(telemetry)
            .build();
        assert!(matches!(result, Err(MonitorError::ArgumentMissing("alarm_sink"))));
    }

    #[test]
    fn test_builder_rejects_zero_interval() {
        let result = RoomMonitor::builder()
            .module_id("m")
            .room_id("lab")
            .source(FixedSource::new(22.0, 45.0, 500.0))
            .alarm_sink(Arc::new(RecordingAlarms::default()))
            .telemetry_sink(Arc::new(RecordingTelemetry::default()))
            .options(MonitorOptions {
                interval: Duration::ZERO,
                ..Default::default()
            })
            .build();
        assert!(matches!(result, Err(MonitorError::InvalidArgument(_))));
    }

    #[test]
    fn test_initial_state() {
        let h = harness(22.0, 45.0, 500.0);
        assert_eq!(h.monitor.hvac_device_id(), "lab_HVAC");
        assert_eq!(h.monitor.setpoint(), DEFAULT_SETPOINT);
        assert_eq!(h.monitor.fan_speed(), FanSpeed::Medium);
        assert_eq!(h.monitor.current_temperature(), None);
        assert_eq!(h.monitor.comfort_score(), None);
        assert_eq!(h.monitor.hvac_mode(), HvacMode::Idle);
        assert!(!h.monitor.is_running());
    }

    #[tokio::test]
    async fn test_cycle_publishes_points_and_state() {
        let h = harness(22.0, 45.0, 500.0);
        h.monitor.run_cycle().await;

        let points = h.telemetry.points.lock().unwrap().clone();
        let devices: Vec<_> = points.iter().map(|p| p.device_id.as_str()).collect();
        assert_eq!(
            devices,
            vec!["lab_Temperature", "lab_Humidity", "lab_CO2", "lab_ComfortScore", "lab_HVAC"]
        );

        let states = h.telemetry.states.lock().unwrap().clone();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].device_id, "lab_HVAC");
        assert_eq!(states[0].current_temperature, Some(22.0));
        assert_eq!(states[0].mode, HvacMode::Idle);

        assert_eq!(h.alarms.count(), 0);
        assert_eq!(h.monitor.current_temperature(), Some(22.0));
        assert!((h.monitor.comfort_score().unwrap() - 100.0).abs() < 0.1);
    }

    #[tokio::test]
    async fn test_mode_follows_temperature() {
        let h = harness(25.0, 45.0, 500.0);
        h.monitor.run_cycle().await;
        assert_eq!(h.monitor.hvac_mode(), HvacMode::Cooling);

        h.source.set(Some(reading(19.0, 45.0, 500.0)));
        h.monitor.run_cycle().await;
        assert_eq!(h.monitor.snapshot().mode, HvacMode::Heating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_same_key_raises_once() {
        let h = harness(30.0, 45.0, 500.0);

        h.monitor.run_cycle().await;
        tokio::time::advance(Duration::from_secs(2)).await;
        h.monitor.run_cycle().await;
        tokio::time::advance(Duration::from_secs(20)).await;
        h.monitor.run_cycle().await;

        let raised = h.alarms.raised.lock().unwrap().clone();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].device_id, "lab_Temperature");
        assert_eq!(raised[0].severity, Severity::Warning);

        tokio::time::advance(Duration::from_secs(10)).await;
        h.monitor.run_cycle().await;
        assert_eq!(h.alarms.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_keys_are_independent() {
        let h = harness(30.0, 75.0, 1800.0);
        h.monitor.run_cycle().await;

        let raised = h.alarms.raised.lock().unwrap().clone();
        assert_eq!(raised.len(), 3);
        assert_eq!(raised[2].device_id, "lab_CO2");
        assert_eq!(raised[2].severity, Severity::Critical);

        // CO2 drops to warning level: same key, still suppressed
        h.source.set(Some(reading(30.0, 75.0, 1200.0)));
        h.monitor.run_cycle().await;
        assert_eq!(h.alarms.count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_does_not_reset_debounce() {
        let h = harness(30.0, 45.0, 500.0);
        h.monitor.run_cycle().await;

        h.source.set(Some(reading(22.0, 45.0, 500.0)));
        tokio::time::advance(Duration::from_secs(5)).await;
        h.monitor.run_cycle().await;

        h.source.set(Some(reading(30.0, 45.0, 500.0)));
        tokio::time::advance(Duration::from_secs(5)).await;
        h.monitor.run_cycle().await;

        assert_eq!(h.alarms.count(), 1);
    }

    #[tokio::test]
    async fn test_failed_pull_keeps_previous_values() {
        let h = harness(23.0, 45.0, 500.0);
        h.monitor.run_cycle().await;
        let score = h.monitor.comfort_score();

        h.source.set(None);
        h.monitor.run_cycle().await;

        assert_eq!(h.monitor.current_temperature(), Some(23.0));
        assert_eq!(h.monitor.comfort_score(), score);
        // remaining steps still run on stale data
        assert_eq!(h.telemetry.state_count(), 2);
        assert_eq!(h.telemetry.points.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_failed_pull_before_first_reading_publishes_state_only() {
        let source = FixedSource::new(22.0, 45.0, 500.0);
        source.set(None);
        let h = harness_with(
            source,
            RecordingAlarms::default(),
            RecordingTelemetry::default(),
            MonitorOptions::default(),
        );

        h.monitor.run_cycle().await;
        assert!(h.telemetry.points.lock().unwrap().is_empty());
        assert_eq!(h.telemetry.state_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_sinks_do_not_fail_cycle() {
        let h = harness_with(
            FixedSource::new(30.0, 45.0, 500.0),
            RecordingAlarms {
                fail: true,
                ..Default::default()
            },
            RecordingTelemetry {
                fail: true,
                ..Default::default()
            },
            MonitorOptions::default(),
        );

        h.monitor.run_cycle().await;
        h.monitor.run_cycle().await;

        assert_eq!(h.telemetry.state_count(), 2);
        assert_eq!(h.monitor.current_temperature(), Some(30.0));
    }

    #[tokio::test]
    async fn test_out_of_range_setpoint_raises_warning() {
        let h = harness(22.0, 45.0, 500.0);
        h.monitor
            .process_command(set_temperature("lab_HVAC", 35.0))
            .await
            .unwrap();

        assert_eq!(h.monitor.setpoint(), DEFAULT_SETPOINT);
        let raised = h.alarms.raised.lock().unwrap().clone();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].severity, Severity::Warning);
        assert!(raised[0].message.starts_with("Invalid setpoint"));
        assert_eq!(h.telemetry.state_count(), 0);
    }

    #[tokio::test]
    async fn test_valid_setpoint_publishes_one_state() {
        let h = harness(22.0, 45.0, 500.0);
        h.monitor
            .process_command(set_temperature("lab_HVAC", 23.0))
            .await
            .unwrap();

        assert_eq!(h.monitor.setpoint(), 23.0);
        let states = h.telemetry.states.lock().unwrap().clone();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].device_id, "lab_HVAC");
        assert_eq!(states[0].setpoint, 23.0);
        assert_eq!(h.alarms.count(), 0);
    }

    #[tokio::test]
    async fn test_fan_speed_commands() {
        let h = harness(22.0, 45.0, 500.0);

        h.monitor
            .process_command(set_fan_speed("lab_HVAC", "high"))
            .await
            .unwrap();
        assert_eq!(h.monitor.fan_speed(), FanSpeed::High);
        assert_eq!(h.telemetry.state_count(), 1);

        let result = h
            .monitor
            .process_command(set_fan_speed("lab_HVAC", "turbo"))
            .await;
        assert!(matches!(result, Err(MonitorError::InvalidArgument(_))));
        assert_eq!(h.monitor.fan_speed(), FanSpeed::High);
        assert_eq!(h.telemetry.state_count(), 1);
    }

    #[tokio::test]
    async fn test_command_for_other_device_is_ignored() {
        let h = harness(22.0, 45.0, 500.0);
        h.monitor
            .process_command(set_temperature("kitchen_HVAC", 25.0))
            .await
            .unwrap();
        h.monitor
            .process_command(set_temperature("lab_HVAC_2", 40.0))
            .await
            .unwrap();

        assert_eq!(h.monitor.setpoint(), DEFAULT_SETPOINT);
        assert_eq!(h.alarms.count(), 0);
        assert_eq!(h.telemetry.state_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_verb_is_noop() {
        let h = harness(22.0, 45.0, 500.0);
        let command = Command::new(
            "lab_HVAC",
            CommandAction::Unknown {
                verb: "Defrost".to_string(),
            },
        );
        h.monitor.process_command(command).await.unwrap();

        assert_eq!(h.alarms.count(), 0);
        assert_eq!(h.telemetry.state_count(), 0);
    }

    #[tokio::test]
    async fn test_command_publish_failure_reported_as_alarm() {
        let h = harness_with(
            FixedSource::new(22.0, 45.0, 500.0),
            RecordingAlarms::default(),
            RecordingTelemetry {
                fail: true,
                ..Default::default()
            },
            MonitorOptions::default(),
        );

        h.monitor
            .process_command(set_temperature("lab_HVAC", 24.0))
            .await
            .unwrap();

        assert_eq!(h.monitor.setpoint(), 24.0);
        let raised = h.alarms.raised.lock().unwrap().clone();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].severity, Severity::Warning);
        assert!(raised[0].message.contains("telemetry bus down"));
    }

    #[tokio::test]
    async fn test_clear_alarm_forwards_to_sink() {
        let h = harness(22.0, 45.0, 500.0);
        h.monitor.clear_alarm("alarm-42").await;
        assert_eq!(*h.alarms.cleared.lock().unwrap(), vec!["alarm-42".to_string()]);
    }

    #[tokio::test]
    async fn test_start_requires_initialized_source() {
        let h = harness_with(
            FixedSource::uninitialized(),
            RecordingAlarms::default(),
            RecordingTelemetry::default(),
            MonitorOptions::default(),
        );
        assert!(matches!(h.monitor.start(), Err(MonitorError::InvalidState(_))));
        assert!(!h.monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_idempotent() {
        let h = harness(22.0, 45.0, 500.0);

        h.monitor.stop().await;
        h.monitor.start().unwrap();
        h.monitor.start().unwrap();
        assert!(h.monitor.is_running());

        h.monitor.stop().await;
        h.monitor.stop().await;
        assert!(!h.monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_runs_on_interval_until_stopped() {
        let h = harness(22.0, 45.0, 500.0);
        h.monitor.start().unwrap();

        tokio::time::sleep(Duration::from_millis(4500)).await;
        let cycles = h.telemetry.state_count();
        assert!((2..=3).contains(&cycles), "unexpected cycle count {}", cycles);

        h.monitor.stop().await;
        let after_stop = h.telemetry.state_count();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.telemetry.state_count(), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_wakes_sleeping_loop() {
        let h = harness_with(
            FixedSource::new(22.0, 45.0, 500.0),
            RecordingAlarms::default(),
            RecordingTelemetry::default(),
            MonitorOptions {
                interval: Duration::from_secs(60),
                ..Default::default()
            },
        );
        h.monitor.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let before = Instant::now();
        h.monitor.stop().await;
        assert!(before.elapsed() < Duration::from_secs(1));
        assert_eq!(h.telemetry.state_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_before_and_during_run() {
        let h = harness(22.0, 45.0, 500.0);
        h.monitor
            .process_command(set_temperature("lab_HVAC", 21.0))
            .await
            .unwrap();

        h.monitor.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.monitor
            .process_command(set_fan_speed("lab_HVAC", "LOW"))
            .await
            .unwrap();
        h.monitor.stop().await;

        let snapshot = h.monitor.snapshot();
        assert_eq!(snapshot.setpoint, 21.0);
        assert_eq!(snapshot.fan_speed, FanSpeed::Low);
        assert_eq!(snapshot.mode, HvacMode::Cooling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_sink_does_not_end_loop() {
        let h = harness_with(
            FixedSource::new(22.0, 45.0, 500.0),
            RecordingAlarms::default(),
            RecordingTelemetry {
                panic_on_point: true,
                ..Default::default()
            },
            MonitorOptions::default(),
        );
        h.monitor.start().unwrap();

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert!(h.monitor.is_running());
        // each cycle reaches the sink once before panicking
        assert!(h.telemetry.points.lock().unwrap().len() >= 2);
        assert_eq!(h.monitor.current_temperature(), Some(22.0));

        h.monitor.stop().await;
        assert!(!h.monitor.is_running());
    }

    #[tokio::test]
    async fn test_command_panic_reported_as_alarm() {
        let h = harness_with(
            FixedSource::new(22.0, 45.0, 500.0),
            RecordingAlarms::default(),
            RecordingTelemetry {
                panic_on_state: true,
                ..Default::default()
            },
            MonitorOptions::default(),
        );

        let result = h
            .monitor
            .process_command(set_temperature("lab_HVAC", 25.0))
            .await;
        assert!(result.is_ok());

        let raised = h.alarms.raised.lock().unwrap().clone();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].severity, Severity::Warning);
        assert!(raised[0].message.contains("state encoder crashed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_refused_while_stop_waits_for_cycle() {
        let h = harness_with(
            FixedSource::new(22.0, 45.0, 500.0),
            RecordingAlarms::default(),
            RecordingTelemetry {
                state_delay: Some(Duration::from_secs(1)),
                ..Default::default()
            },
            MonitorOptions::default(),
        );
        let telemetry = h.telemetry.clone();
        let monitor = Arc::new(h.monitor);

        monitor.start().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let stopper = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.stop().await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;

        // first cycle is still inside the slow sink
        assert_eq!(telemetry.state_count(), 0);
        assert!(matches!(monitor.start(), Err(MonitorError::InvalidState(_))));
        assert!(!monitor.is_running());

        stopper.await.unwrap();
        assert_eq!(telemetry.state_count(), 1);

        monitor.start().unwrap();
        assert!(monitor.is_running());
        monitor.stop().await;
    }
}
