//! Shared doubles and fixtures for the daemon test suites.

mod harness;
mod process;
mod reporter;

pub use harness::{Harness, WEATHER_MANIFEST, weather_entry, weather_id};
pub use process::{TestShutdownSignal, free_local_address, test_config};
pub use reporter::{HealthEvent, RecordingHealthReporter};
