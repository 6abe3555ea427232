mod constants;
mod types;
mod controller;

pub mod clock;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod format;
pub mod mock;
pub mod state;
pub mod transform;
pub mod transport;

pub use controller::{MountController, MountError};
pub use types::{Axis, Direction, Hemisphere, MountStatus, MountTime, Observer, RaDec, TrackingMode};

// Re-export commonly used items
pub use constants::{DEFAULT_BAUD_RATE, DEFAULT_JOG_SPEED, DEFAULT_PORT, DEFAULT_STEPS_PER_REV};
