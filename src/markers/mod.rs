//! Marker schedule loading and the scheduler that applies it during recording.

pub mod schedule;
pub mod scheduler;

pub use schedule::{MarkerEvent, MarkerSchedule};
pub use scheduler::{MarkerAction, MarkerScheduler};
