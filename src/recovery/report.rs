use serde::Serialize;

use super::classify::FailureCategory;
use super::remediation::RemediationAction;
use super::state::RecoveryState;

/// The fault currently held by a boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub category: FailureCategory,
    pub error: String,
    /// 1-based operation attempt that produced this fault.
    pub attempt: u32,
    /// Remediation actions taken for this fault, in order.
    pub actions: Vec<RemediationAction>,
}

/// What the presentation layer renders for a boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
    pub boundary: String,
    pub state: RecoveryState,
    pub category: Option<FailureCategory>,
    pub error: Option<String>,
    pub message: String,
    /// Every remediation action since the last reset, oldest first.
    pub actions: Vec<RemediationAction>,
    pub retry_count: u32,
    pub max_retry_attempts: u32,
}

impl FailureReport {
    pub fn is_terminal(&self) -> bool {
        self.state == RecoveryState::Terminal
    }

    /// Transient failures offer a retry; terminal ones offer only reset.
    pub fn can_retry(&self) -> bool {
        !self.is_terminal() && self.retry_count < self.max_retry_attempts
    }

    pub fn requires_reset(&self) -> bool {
        self.is_terminal()
    }

    /// "attempt 2 of 3" style counter for the retry affordance.
    pub fn attempt_label(&self) -> String {
        format!(
            "attempt {} of {}",
            (self.retry_count + 1).min(self.max_retry_attempts),
            self.max_retry_attempts
        )
    }

    pub fn action_summary(&self) -> Vec<&'static str> {
        self.actions.iter().map(|action| action.describe()).collect()
    }
}
