//! Failure classification and bounded-retry recovery.
//!
//! ```text
//! Stable --fault--> Faulted --remediate--> Recovering --settle--> Stable
//!                      |                        |
//!                      +--budget/host--> Terminal <--remediation error
//! ```
//!
//! # INVARIANT
//! Only `reset()` leaves `Terminal`. Delayed steps (settle delay, telemetry
//! restart) belong to the boundary's current epoch and are discarded once it
//! is reset or dropped.

pub mod classify;
pub mod orchestrator;
pub mod remediation;
pub mod report;
pub mod state;

pub use classify::{ClassificationRule, Classifier, FailureCategory, Fault};
pub use orchestrator::{
    FailureObserver, ProtectedError, RecoveryError, RecoveryOrchestrator, RecoveryOutcome,
};
pub use remediation::{InMemoryStateStore, LocalStateStore, RemediationAction, RemediationError};
pub use report::{FailureRecord, FailureReport};
pub use state::{RecoveryGraph, RecoveryRequest, RecoveryState};
