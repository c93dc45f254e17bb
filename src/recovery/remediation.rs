use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::classify::FailureCategory;
use crate::services::Services;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    ClearResultCache,
    ClearLocalState,
    StopTelemetry,
    ScheduleTelemetryRestart,
    ManualInterventionRequired,
}

impl RemediationAction {
    pub const fn describe(self) -> &'static str {
        match self {
            Self::ClearResultCache => "cleared cached results",
            Self::ClearLocalState => "cleared local add-in state",
            Self::StopTelemetry => "stopped performance monitoring",
            Self::ScheduleTelemetryRestart => "scheduled monitoring restart",
            Self::ManualInterventionRequired => "requested manual intervention",
        }
    }
}

/// The remediation set for a category, in execution order.
pub fn plan(category: FailureCategory) -> &'static [RemediationAction] {
    use RemediationAction::*;
    match category {
        FailureCategory::Cache => &[ClearResultCache, ClearLocalState],
        FailureCategory::Telemetry => &[StopTelemetry, ScheduleTelemetryRestart],
        FailureCategory::HostIntegration => &[ManualInterventionRequired],
        FailureCategory::Calculation | FailureCategory::Unclassified => &[ClearResultCache],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remediation {action:?} failed: {reason}")]
pub struct RemediationError {
    pub action: RemediationAction,
    pub reason: String,
}

/// Add-in state persisted outside the result cache (wizard drafts, saved
/// selections). Cleared alongside the cache on cache-classified faults.
pub trait LocalStateStore: Send + Sync {
    fn name(&self) -> &str;
    fn clear(&self) -> Result<(), String>;
}

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    name: String,
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryStateStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Mutex::new(HashMap::new()),
        }
    }

    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.lock().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl LocalStateStore for InMemoryStateStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn clear(&self) -> Result<(), String> {
        self.values.lock().clear();
        Ok(())
    }
}

/// Tracks the outstanding delayed telemetry restart of one boundary.
///
/// Each schedule issues a fresh ticket; only the holder of the latest ticket
/// may restart monitoring, so a newer remediation's delay is never cut short
/// by an older timer.
#[derive(Debug, Default)]
pub(crate) struct RestartTicket {
    issued: AtomicU64,
    // Ticket of the restart still waiting to fire; zero when none.
    pending: AtomicU64,
}

impl RestartTicket {
    fn issue(&self) -> u64 {
        let ticket = self.issued.fetch_add(1, Ordering::AcqRel) + 1;
        self.pending.store(ticket, Ordering::Release);
        ticket
    }

    fn redeem(&self, ticket: u64) -> bool {
        self.pending
            .compare_exchange(ticket, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Drops whatever restart is outstanding. Returns whether one was.
    pub fn take(&self) -> bool {
        self.pending.swap(0, Ordering::AcqRel) != 0
    }
}

/// Executes remediation actions against the shared services.
pub(crate) struct Remediator<'a> {
    pub services: &'a Services,
    pub stores: &'a [Arc<dyn LocalStateStore>],
    pub cancel: CancellationToken,
    pub restart_delay: Duration,
    pub restart: Arc<RestartTicket>,
}

impl Remediator<'_> {
    /// Runs `actions` in order and stops at the first failure. Returns the
    /// actions that completed, plus the failure if one occurred.
    pub fn apply_all(
        &self,
        actions: &[RemediationAction],
    ) -> (Vec<RemediationAction>, Option<RemediationError>) {
        let mut applied = Vec::with_capacity(actions.len());
        for action in actions {
            match self.apply(*action) {
                Ok(()) => applied.push(*action),
                Err(err) => return (applied, Some(err)),
            }
        }
        (applied, None)
    }

    fn apply(&self, action: RemediationAction) -> Result<(), RemediationError> {
        match action {
            RemediationAction::ClearResultCache => {
                self.services.clear_cache();
                Ok(())
            }
            RemediationAction::ClearLocalState => {
                for store in self.stores {
                    store.clear().map_err(|reason| RemediationError {
                        action,
                        reason: format!("{}: {reason}", store.name()),
                    })?;
                    debug!(store = store.name(), "Local state cleared");
                }
                Ok(())
            }
            RemediationAction::StopTelemetry => {
                self.services.telemetry().stop_monitoring();
                Ok(())
            }
            RemediationAction::ScheduleTelemetryRestart => {
                self.schedule_telemetry_restart();
                Ok(())
            }
            // Nothing automated; the boundary surfaces the fault instead.
            RemediationAction::ManualInterventionRequired => Ok(()),
        }
    }

    fn schedule_telemetry_restart(&self) {
        let telemetry = Arc::clone(self.services.telemetry());
        let token = self.cancel.clone();
        let restart = Arc::clone(&self.restart);
        let delay = self.restart_delay;
        let ticket = restart.issue();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Delayed telemetry restart cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    if restart.redeem(ticket) {
                        telemetry.start_monitoring();
                        info!(delay_ms = delay.as_millis() as u64, "Telemetry restarted after remediation");
                    } else {
                        debug!(ticket, "Superseded telemetry restart skipped");
                    }
                }
            }
        });
    }
}
