// Single-room environmental monitor: sampling, comfort scoring, alarms and HVAC control
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use application::room_monitor::{MonitorOptions, RoomMonitor};
pub use error::MonitorError;
