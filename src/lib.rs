pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod recovery;
pub mod services;
pub mod telemetry;

// Re-export specific items for convenient access
pub use cache::{CacheStatus, ResultCache};
pub use config::WaccConfig;
pub use engine::{InputSnapshot, WaccEngine, WaccResult};
pub use error::CalculationError;
pub use recovery::RecoveryOrchestrator;
pub use services::Services;
pub use telemetry::TelemetryRecorder;
