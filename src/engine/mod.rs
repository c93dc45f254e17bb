pub mod calculator;
pub mod fingerprint;
pub mod input;
pub mod result;

use std::time::Instant;

use tracing::{debug, warn};

use crate::config::ValidationConfig;
use crate::error::CalculationError;
use crate::services::Services;
use crate::telemetry::event::{names, tags, MetricEvent};
use crate::telemetry::TelemetrySnapshot;

pub use fingerprint::Fingerprint;
pub use input::{BuildUpComponent, CapitalWeights, CostOfDebtMode, InputSnapshot};
pub use result::{PerformanceMetrics, WaccBreakdown, WaccResult};

/// Validates, fingerprints and computes, reading through the shared cache.
///
/// Every call to `calculate` emits exactly one metric event:
/// `calculation.duration` on success, `calculation.invalid` when validation
/// rejects the snapshot, `calculation.failed` otherwise.
#[derive(Debug, Clone)]
pub struct WaccEngine {
    services: Services,
    weight_tolerance: f64,
}

impl WaccEngine {
    pub fn new(services: Services, config: &ValidationConfig) -> Self {
        Self {
            services,
            weight_tolerance: config.weight_tolerance,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub async fn calculate(&self, input: &InputSnapshot) -> Result<WaccResult, CalculationError> {
        let started = Instant::now();

        // Invalid snapshots never reach the cache.
        if let Err(err) = input.validate(self.weight_tolerance) {
            debug!(error = %err, "Snapshot rejected");
            self.services.telemetry().record_metric(
                MetricEvent::new(names::CALCULATION_INVALID, 1.0)
                    .with_tag(tags::CALCULATION)
                    .with_meta("path", err.path().unwrap_or_default()),
            );
            return Err(err);
        }

        let fingerprint = Fingerprint::of(input);
        let outcome = self
            .services
            .cache()
            .get_or_compute(fingerprint, || async move { calculator::compute(input, fingerprint) })
            .await;
        let duration = started.elapsed();

        match outcome {
            Ok((breakdown, cache_status)) => {
                self.services.telemetry().record_metric(
                    MetricEvent::new(names::CALCULATION_DURATION, duration.as_secs_f64() * 1_000.0)
                        .with_tag(tags::CALCULATION)
                        .with_tag(cache_status.tag())
                        .with_meta("fingerprint", fingerprint.short())
                        .with_meta("mode", input.mode.label()),
                );
                debug!(
                    fingerprint = %fingerprint.short(),
                    wacc = breakdown.wacc,
                    ?cache_status,
                    "WACC calculated"
                );
                Ok(WaccResult {
                    breakdown,
                    performance: PerformanceMetrics {
                        duration,
                        cache_status,
                    },
                })
            }
            Err(err) => {
                warn!(fingerprint = %fingerprint.short(), error = %err, "WACC calculation failed");
                self.services.telemetry().record_metric(
                    MetricEvent::new(names::CALCULATION_FAILED, 1.0)
                        .with_tag(tags::CALCULATION)
                        .with_meta("fingerprint", fingerprint.short())
                        .with_meta("error", err.to_string()),
                );
                Err(err)
            }
        }
    }

    pub fn fingerprint(&self, input: &InputSnapshot) -> Fingerprint {
        Fingerprint::of(input)
    }

    pub fn clear_cache(&self) {
        self.services.clear_cache();
    }

    /// Drops the cached result for `input`, if any.
    pub fn invalidate(&self, input: &InputSnapshot) -> bool {
        self.services.cache().invalidate(Fingerprint::of(input))
    }

    pub fn metrics(&self) -> TelemetrySnapshot {
        self.services.telemetry().snapshot()
    }
}
