// Application layer - Ports and the monitoring use case
pub mod room_monitor;
pub mod sample_source;
pub mod sinks;
pub mod thresholds;
