// File-backed sample source replaying CSV rows in a loop
use crate::application::sample_source::SampleSource;
use crate::domain::reading::Reading;
use crate::error::{MonitorError, Result};
use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const TIMESTAMP_INDEX: usize = 0;
const ROOM_ID_INDEX: usize = 1;
const TEMPERATURE_INDEX: usize = 2;
const HUMIDITY_INDEX: usize = 3;
const CO2_INDEX: usize = 4;

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"];

#[derive(Debug)]
struct Samples {
    readings: Vec<Reading>,
    cursor: usize,
}

/// Replays a fixed set of readings loaded from a
/// `timestamp,roomId,temperature,humidity,co2` file, wrapping after the
/// last row. The cursor is shared, so concurrent callers see each row
/// exactly once per pass.
#[derive(Debug, Default)]
pub struct CsvSampleSource {
    samples: Mutex<Option<Samples>>,
}

impl CsvSampleSource {
    /// Create an empty source; call [`CsvSampleSource::initialize`] before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and initialize a source from a file in one step.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let source = Self::new();
        source.initialize(path)?;
        Ok(source)
    }

    /// Load every parseable row from `path`, replacing any previous data and
    /// rewinding the cursor. Returns the number of rows loaded.
    pub fn initialize(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => MonitorError::NotFound(path.to_path_buf()),
            _ => MonitorError::Invalid(format!("failed to open {}: {}", path.display(), e)),
        })?;

        let count = self.load(file)?;
        tracing::info!(path = %path.display(), rows = count, "Sample source initialized");
        Ok(count)
    }

    /// Load rows from any reader. Same rules as [`CsvSampleSource::initialize`].
    pub fn load<R: Read>(&self, reader: R) -> Result<usize> {
        let readings = parse_readings(reader);
        if readings.is_empty() {
            return Err(MonitorError::Invalid("no parseable rows".to_string()));
        }

        let count = readings.len();
        *self.lock() = Some(Samples {
            readings,
            cursor: 0,
        });
        Ok(count)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Samples>> {
        self.samples.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SampleSource for CsvSampleSource {
    fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    fn next_reading(&self) -> anyhow::Result<Reading> {
        let mut guard = self.lock();
        let samples = guard
            .as_mut()
            .ok_or_else(|| anyhow!("sample source is not initialized"))?;

        let reading = samples.readings[samples.cursor].clone();
        samples.cursor = (samples.cursor + 1) % samples.readings.len();
        Ok(reading)
    }
}

fn parse_readings<R: Read>(reader: R) -> Vec<Reading> {
    let mut csv = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut readings = Vec::new();
    for (index, result) in csv.records().enumerate() {
        // header is line 1
        let line = index + 2;
        let parsed = result
            .context("unreadable row")
            .and_then(|record| parse_record(&record));
        match parsed {
            Ok(reading) => readings.push(reading),
            Err(e) => tracing::warn!(line, error = %e, "Skipping malformed sample row"),
        }
    }
    readings
}

fn parse_record(record: &StringRecord) -> anyhow::Result<Reading> {
    if record.len() < 5 {
        anyhow::bail!("expected 5 fields, found {}", record.len());
    }

    let timestamp = parse_timestamp(&record[TIMESTAMP_INDEX])?;
    let room_id = record[ROOM_ID_INDEX].to_string();
    let temperature = parse_number(record, TEMPERATURE_INDEX, "temperature")?;
    let humidity = parse_number(record, HUMIDITY_INDEX, "humidity")?;
    let co2 = parse_number(record, CO2_INDEX, "CO2")?;

    Ok(Reading::new(timestamp, room_id, temperature, humidity, co2))
}

fn parse_number(record: &StringRecord, index: usize, field: &str) -> anyhow::Result<f64> {
    let value: f64 = record[index]
        .parse()
        .with_context(|| format!("failed to parse {}: {}", field, &record[index]))?;
    if !value.is_finite() {
        anyhow::bail!("{} is not a finite number: {}", field, &record[index]);
    }
    Ok(value)
}

fn parse_timestamp(raw: &str) -> anyhow::Result<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| anyhow!("failed to parse timestamp: {}", raw))
}
