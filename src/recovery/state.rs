use serde::{Deserialize, Serialize};

/// Lifecycle of one protected boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryState {
    /// No outstanding fault. Protected operations run.
    #[default]
    Stable,
    /// A fault was caught and classified; recovery has not started.
    Faulted,
    /// Remediation is running or the settle delay is pending.
    Recovering,
    /// Surfaced to the user. Only `reset()` leaves this state.
    Terminal,
}

/// Requests a boundary transition. The graph decides whether it applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryRequest {
    FaultObserved,
    BeginRecovery,
    RemediationSucceeded,
    RemediationFailed,
    BudgetExhausted,
    ManualHandlingRequired,
    Reset,
}

pub struct RecoveryGraph;

impl RecoveryGraph {
    /// Pure function: (Current State, Request) -> New State.
    /// Returns None if the transition is invalid/ignored.
    pub fn transition(current: RecoveryState, request: RecoveryRequest) -> Option<RecoveryState> {
        use RecoveryRequest::*;
        use RecoveryState::*;

        match (current, request) {
            // Manual reset wins from anywhere.
            (_, Reset) => Some(Stable),

            (Stable, FaultObserved) => Some(Faulted),
            // Another fault while awaiting a manual retry replaces the record.
            (Faulted, FaultObserved) => Some(Faulted),

            (Faulted, BeginRecovery) => Some(Recovering),
            (Faulted, BudgetExhausted) => Some(Terminal),
            (Faulted, ManualHandlingRequired) => Some(Terminal),

            (Recovering, RemediationSucceeded) => Some(Stable),
            (Recovering, RemediationFailed) => Some(Terminal),

            // Terminal swallows faults; Recovering finishes its cycle first.
            _ => None,
        }
    }
}
