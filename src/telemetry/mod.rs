//! Performance telemetry.
//!
//! # SAFETY INVARIANT
//! Telemetry is a best-effort side-effect layer.
//! Recording must **NEVER** fail, block on I/O, or feed back into the
//! arithmetic of the calculation engine.
//!
//! # PRIVACY INVARIANT
//! Events carry fingerprints, categories, counts and durations only.
//! Raw input values from the workbook never enter the buffer.

pub mod event;
pub mod metrics;
pub mod recorder;

pub use event::MetricEvent;
pub use metrics::TelemetrySnapshot;
pub use recorder::TelemetryRecorder;
