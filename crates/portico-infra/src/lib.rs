//! Portico Infrastructure Library
//!
//! Shared infrastructure for Portico services. Currently tracing subscriber
//! initialisation.

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat};
