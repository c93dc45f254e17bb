use std::sync::Arc;

use crate::cache::ResultCache;
use crate::config::WaccConfig;
use crate::telemetry::event::{names, tags, MetricEvent};
use crate::telemetry::TelemetryRecorder;

/// Handles to the two shared services. Cloned into the engine and into every
/// recovery boundary; all mutation goes through the services' own methods.
#[derive(Debug, Clone)]
pub struct Services {
    cache: Arc<ResultCache>,
    telemetry: Arc<TelemetryRecorder>,
}

impl Services {
    pub fn new(cache: Arc<ResultCache>, telemetry: Arc<TelemetryRecorder>) -> Self {
        Self { cache, telemetry }
    }

    pub fn from_config(config: &WaccConfig) -> Self {
        Self::new(
            Arc::new(ResultCache::new(config.cache.clone())),
            Arc::new(TelemetryRecorder::new(&config.telemetry)),
        )
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn telemetry(&self) -> &Arc<TelemetryRecorder> {
        &self.telemetry
    }

    /// Clears the result cache and records that it happened.
    pub fn clear_cache(&self) {
        let removed = self.cache.stats().ready;
        self.cache.clear();
        self.telemetry.record_metric(
            MetricEvent::new(names::CACHE_CLEARED, removed as f64).with_tag(tags::CACHE),
        );
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::from_config(&WaccConfig::default())
    }
}
