use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use super::event::{names, tags, MetricEvent};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub monitoring: bool,
    pub total_events: u64,
    pub dropped_while_stopped: u64,
    pub overflowed: u64,
    pub by_name: BTreeMap<String, MetricSummary>,
    pub cache_stats: CacheTelemetry,
    pub recovery_stats: RecoveryTelemetry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricSummary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheTelemetry {
    pub hits: u64,
    pub misses: u64,
    pub joined: u64,
    pub hit_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoveryTelemetry {
    pub faults: u64,
    pub remediations: u64,
    pub recovered: u64,
    pub terminal: u64,
    pub faults_by_category: BTreeMap<String, u64>,
}

pub fn compute_snapshot(events: &VecDeque<MetricEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot {
        total_events: events.len() as u64,
        ..TelemetrySnapshot::default()
    };

    for event in events {
        let summary = snap
            .by_name
            .entry(event.name.clone())
            .or_insert_with(|| MetricSummary {
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
                ..MetricSummary::default()
            });
        summary.count += 1;
        summary.sum += event.value;
        summary.min = summary.min.min(event.value);
        summary.max = summary.max.max(event.value);

        if event.has_tag(tags::CACHE_HIT) {
            snap.cache_stats.hits += 1;
        } else if event.has_tag(tags::CACHE_MISS) {
            snap.cache_stats.misses += 1;
        } else if event.has_tag(tags::CACHE_JOINED) {
            snap.cache_stats.joined += 1;
        }

        match event.name.as_str() {
            names::RECOVERY_FAULT => {
                snap.recovery_stats.faults += 1;
                if let Some(category) = event.category() {
                    *snap
                        .recovery_stats
                        .faults_by_category
                        .entry(category.to_string())
                        .or_insert(0) += 1;
                }
            }
            names::RECOVERY_REMEDIATION => snap.recovery_stats.remediations += 1,
            names::RECOVERY_RECOVERED => snap.recovery_stats.recovered += 1,
            names::RECOVERY_TERMINAL => snap.recovery_stats.terminal += 1,
            _ => {}
        }
    }

    for summary in snap.by_name.values_mut() {
        summary.mean = summary.sum / summary.count as f64;
    }

    let lookups = snap.cache_stats.hits + snap.cache_stats.misses + snap.cache_stats.joined;
    if lookups > 0 {
        // Joined callers did not pay for a computation either.
        snap.cache_stats.hit_ratio =
            (snap.cache_stats.hits + snap.cache_stats.joined) as f64 / lookups as f64;
    }

    snap
}
