use std::collections::{BTreeMap, BTreeSet};
use std::time::SystemTime;

use serde::Serialize;

// Allowed in metadata: fingerprints, categories, counts, durations.
// Forbidden: raw input values (component names, rates).

pub mod names {
    pub const CALCULATION_DURATION: &str = "calculation.duration";
    pub const CALCULATION_INVALID: &str = "calculation.invalid";
    pub const CALCULATION_FAILED: &str = "calculation.failed";
    pub const CACHE_CLEARED: &str = "cache.cleared";
    pub const RECOVERY_FAULT: &str = "recovery.fault";
    pub const RECOVERY_REMEDIATION: &str = "recovery.remediation";
    pub const RECOVERY_RECOVERED: &str = "recovery.recovered";
    pub const RECOVERY_TERMINAL: &str = "recovery.terminal";
}

pub mod tags {
    pub const CALCULATION: &str = "calculation";
    pub const CACHE: &str = "cache";
    pub const RECOVERY: &str = "recovery";
    pub const CACHE_HIT: &str = "cache:hit";
    pub const CACHE_MISS: &str = "cache:miss";
    pub const CACHE_JOINED: &str = "cache:joined";
    pub const CATEGORY_PREFIX: &str = "category:";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEvent {
    pub name: String,
    pub value: f64,
    pub timestamp: SystemTime,
    /// Assigned by the recorder on acceptance; zero until then.
    pub sequence: u64,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub tags: BTreeSet<String>,
}

impl MetricEvent {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp: SystemTime::now(),
            sequence: 0,
            metadata: BTreeMap::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// The `category:*` tag, if the event carries one.
    pub fn category(&self) -> Option<&str> {
        self.tags
            .iter()
            .find_map(|tag| tag.strip_prefix(tags::CATEGORY_PREFIX))
    }
}
