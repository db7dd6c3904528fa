// Port for anything that can produce sensor readings
use crate::domain::reading::Reading;

/// Source of room readings pulled once per monitor cycle.
///
/// Implementations must be cheap to call: the monitor invokes
/// `next_reading` while a cycle is in progress.
pub trait SampleSource: Send + Sync {
    /// Whether the source has data loaded and can serve readings.
    fn is_initialized(&self) -> bool;

    /// Produce the next reading.
    fn next_reading(&self) -> anyhow::Result<Reading>;
}
