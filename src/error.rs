use thiserror::Error;

use crate::recovery::classify::FailureCategory;

/// Every failure the calculation path can surface.
///
/// `Clone` so a single failed computation can be handed to every caller
/// waiting on the same cache entry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalculationError {
    /// Caller-fixable. Reported immediately, never retried automatically.
    #[error("invalid input at `{path}`: {reason}")]
    InvalidInput { path: String, reason: String },

    #[error("computation failed: {0}")]
    ComputationFailure(String),

    #[error("cache failure: {0}")]
    CacheFailure(String),

    #[error("telemetry failure: {0}")]
    TelemetryFailure(String),

    #[error("host integration failure: {0}")]
    HostIntegrationFailure(String),

    #[error("{0}")]
    Unclassified(String),
}

impl CalculationError {
    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }

    /// Field path of an `InvalidInput`, e.g. `build_up[2].value`.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::InvalidInput { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The category implied by the variant. `Unclassified` carries no tag and
    /// is left to the classifier's precedence rules.
    pub fn declared_category(&self) -> Option<FailureCategory> {
        match self {
            Self::InvalidInput { .. } | Self::ComputationFailure(_) => {
                Some(FailureCategory::Calculation)
            }
            Self::CacheFailure(_) => Some(FailureCategory::Cache),
            Self::TelemetryFailure(_) => Some(FailureCategory::Telemetry),
            Self::HostIntegrationFailure(_) => Some(FailureCategory::HostIntegration),
            Self::Unclassified(_) => None,
        }
    }
}
