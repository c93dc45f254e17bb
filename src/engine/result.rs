use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::fingerprint::Fingerprint;
use super::input::CostOfDebtMode;
use crate::cache::CacheStatus;

/// The numbers of one calculation. Produced once per fingerprint and shared
/// by reference with every caller that reads the same cache entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaccBreakdown {
    pub fingerprint: Fingerprint,
    pub mode: CostOfDebtMode,
    pub cost_of_equity: f64,
    pub pre_tax_cost_of_debt: f64,
    pub after_tax_cost_of_debt: f64,
    /// Fractions of total capital (0.0 - 1.0).
    pub equity_weight: f64,
    pub debt_weight: f64,
    pub equity_contribution: f64,
    pub debt_contribution: f64,
    pub wacc: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub duration: Duration,
    pub cache_status: CacheStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaccResult {
    pub breakdown: Arc<WaccBreakdown>,
    /// Per-invocation: a hit and the miss that produced it differ here only.
    pub performance: PerformanceMetrics,
}

impl WaccResult {
    pub fn wacc(&self) -> f64 {
        self.breakdown.wacc
    }

    pub fn cost_of_equity(&self) -> f64 {
        self.breakdown.cost_of_equity
    }

    pub fn after_tax_cost_of_debt(&self) -> f64 {
        self.breakdown.after_tax_cost_of_debt
    }

    pub fn cache_status(&self) -> CacheStatus {
        self.performance.cache_status
    }

    /// True if both results point at the same cached breakdown.
    pub fn shares_breakdown_with(&self, other: &WaccResult) -> bool {
        Arc::ptr_eq(&self.breakdown, &other.breakdown)
    }
}
