use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::classify::{Classifier, FailureCategory, Fault};
use super::remediation::{self, LocalStateStore, RemediationAction, Remediator, RestartTicket};
use super::report::{FailureRecord, FailureReport};
use super::state::{RecoveryGraph, RecoveryRequest, RecoveryState};
use crate::config::RecoveryConfig;
use crate::error::CalculationError;
use crate::services::Services;
use crate::telemetry::event::{names, tags, MetricEvent};

/// UI callback invoked with every report a boundary produces.
pub type FailureObserver = Arc<dyn Fn(&FailureReport) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    /// Caller-fixable input error. The boundary did not change state.
    Rejected,
    /// Remediation ran and the boundary is stable; the caller may retry.
    Recovered(FailureReport),
    /// Auto-recovery is off; waiting on `retry()` or `reset()`.
    AwaitingRetry(FailureReport),
    Terminal(FailureReport),
    /// The boundary was reset while recovery was in flight.
    Cancelled,
    /// A recovery cycle was already running; the fault was not recorded.
    Busy,
}

impl RecoveryOutcome {
    pub fn report(&self) -> Option<&FailureReport> {
        match self {
            Self::Recovered(report) | Self::AwaitingRetry(report) | Self::Terminal(report) => {
                Some(report)
            }
            Self::Rejected | Self::Cancelled | Self::Busy => None,
        }
    }

    pub fn may_retry(&self) -> bool {
        matches!(self, Self::Recovered(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    #[error("boundary `{0}` has no fault to retry")]
    NotFaulted(String),
    #[error("boundary `{0}` is already recovering")]
    InProgress(String),
    #[error("boundary `{0}` is terminal; reset required")]
    Terminal(String),
}

#[derive(Debug, Error)]
pub enum ProtectedError {
    #[error(transparent)]
    InvalidInput(CalculationError),
    #[error("boundary `{}` is terminal: {}", .0.boundary, .0.message)]
    Terminal(FailureReport),
    #[error("boundary `{}` is waiting for a manual retry", .0.boundary)]
    AwaitingRetry(FailureReport),
    #[error("boundary is recovering")]
    Recovering,
    #[error("{error}")]
    Failed {
        error: CalculationError,
        outcome: RecoveryOutcome,
    },
}

struct BoundaryState {
    state: RecoveryState,
    retry_count: u32,
    record: Option<FailureRecord>,
    history: Vec<RemediationAction>,
    // Bumped on reset; delayed steps from an older epoch are discarded.
    epoch: u64,
    cancel: CancellationToken,
}

enum Step {
    Recover { epoch: u64, token: CancellationToken },
    Finished(RecoveryOutcome),
}

/// Bounded-retry recovery for one protected boundary.
///
/// Holds no resources besides its state fields and handles to the shared
/// services, so any number of boundaries may share one `Services`.
pub struct RecoveryOrchestrator {
    id: Uuid,
    name: String,
    config: RecoveryConfig,
    services: Services,
    classifier: Classifier,
    stores: Vec<Arc<dyn LocalStateStore>>,
    observers: Mutex<Vec<FailureObserver>>,
    restart: Arc<RestartTicket>,
    inner: Mutex<BoundaryState>,
}

impl RecoveryOrchestrator {
    pub fn new(name: impl Into<String>, services: Services, config: RecoveryConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            config,
            services,
            classifier: Classifier::default(),
            stores: Vec::new(),
            observers: Mutex::new(Vec::new()),
            restart: Arc::new(RestartTicket::default()),
            inner: Mutex::new(BoundaryState {
                state: RecoveryState::Stable,
                retry_count: 0,
                record: None,
                history: Vec::new(),
                epoch: 0,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_local_state(mut self, store: Arc<dyn LocalStateStore>) -> Self {
        self.stores.push(store);
        self
    }

    pub fn add_observer(&self, observer: FailureObserver) {
        self.observers.lock().push(observer);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn state(&self) -> RecoveryState {
        self.inner.lock().state
    }

    pub fn retry_count(&self) -> u32 {
        self.inner.lock().retry_count
    }

    pub fn current_failure(&self) -> Option<FailureRecord> {
        self.inner.lock().record.clone()
    }

    /// Remediation actions taken since the last reset.
    pub fn history(&self) -> Vec<RemediationAction> {
        self.inner.lock().history.clone()
    }

    pub fn report(&self) -> FailureReport {
        self.report_locked(&self.inner.lock())
    }

    /// Runs `operation` inside the boundary.
    ///
    /// Invalid input is handed straight back. A terminal, recovering or
    /// awaiting-retry boundary refuses to run. Any other failure goes through
    /// the recovery state machine before being returned.
    pub async fn protect<T, F, Fut>(&self, operation: F) -> Result<T, ProtectedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CalculationError>>,
    {
        match self.state() {
            RecoveryState::Terminal => return Err(ProtectedError::Terminal(self.report())),
            RecoveryState::Faulted => return Err(ProtectedError::AwaitingRetry(self.report())),
            RecoveryState::Recovering => return Err(ProtectedError::Recovering),
            RecoveryState::Stable => {}
        }

        match operation().await {
            Ok(value) => Ok(value),
            Err(err) if err.is_invalid_input() => Err(ProtectedError::InvalidInput(err)),
            Err(err) => {
                let outcome = self.handle_failure(&err).await;
                Err(ProtectedError::Failed { error: err, outcome })
            }
        }
    }

    /// Classifies a caught failure and drives the boundary through the
    /// state machine: remediation and settle delay on the happy path,
    /// terminal when the budget is spent or remediation fails.
    pub async fn handle_failure(&self, fault: impl Into<Fault>) -> RecoveryOutcome {
        let fault = fault.into();
        if fault.caller_fixable {
            debug!(boundary = %self.name, "Caller-fixable fault passed through untouched");
            return RecoveryOutcome::Rejected;
        }

        let category = self.classifier.classify(&fault);
        let step = {
            let mut inner = self.inner.lock();
            if !Self::apply(&mut inner, RecoveryRequest::FaultObserved) {
                debug!(boundary = %self.name, state = ?inner.state, "Fault ignored in current state");
                return match inner.state {
                    RecoveryState::Terminal => RecoveryOutcome::Terminal(self.report_locked(&inner)),
                    _ => RecoveryOutcome::Busy,
                };
            }

            inner.record = Some(FailureRecord {
                category,
                error: fault.description(),
                attempt: inner.retry_count + 1,
                actions: Vec::new(),
            });
            warn!(
                boundary = %self.name,
                category = category.label(),
                retry_count = inner.retry_count,
                error = %fault.description(),
                "Boundary faulted"
            );
            self.emit(names::RECOVERY_FAULT, category, inner.retry_count, &[]);
            self.decide(&mut inner, category)
        };

        self.proceed(step, category).await
    }

    /// Manually runs one recovery cycle for a boundary left in `Faulted`
    /// (auto-recovery disabled).
    pub async fn retry(&self) -> Result<RecoveryOutcome, RecoveryError> {
        let (step, category) = {
            let mut inner = self.inner.lock();
            match inner.state {
                RecoveryState::Stable => return Err(RecoveryError::NotFaulted(self.name.clone())),
                RecoveryState::Recovering => {
                    return Err(RecoveryError::InProgress(self.name.clone()))
                }
                RecoveryState::Terminal => return Err(RecoveryError::Terminal(self.name.clone())),
                RecoveryState::Faulted => {}
            }
            let category = inner
                .record
                .as_ref()
                .map(|record| record.category)
                .unwrap_or(FailureCategory::Unclassified);
            Self::apply(&mut inner, RecoveryRequest::BeginRecovery);
            let step = Step::Recover {
                epoch: inner.epoch,
                token: inner.cancel.clone(),
            };
            (step, category)
        };

        Ok(self.proceed(step, category).await)
    }

    /// Returns to `Stable` from any state, zeroes the retry counter, clears
    /// the remediation history and cancels pending delayed steps.
    pub fn reset(&self) {
        {
            let mut inner = self.inner.lock();
            inner.cancel.cancel();
            inner.cancel = CancellationToken::new();
            inner.epoch += 1;
            Self::apply(&mut inner, RecoveryRequest::Reset);
            inner.retry_count = 0;
            inner.record = None;
            inner.history.clear();
        }
        // The cancelled restart would have left monitoring off for good.
        if self.restart.take() {
            self.services.telemetry().start_monitoring();
        }
        info!(boundary = %self.name, "Boundary reset");
    }

    fn decide(&self, inner: &mut BoundaryState, category: FailureCategory) -> Step {
        if !category.auto_recoverable() {
            Self::apply(inner, RecoveryRequest::ManualHandlingRequired);
            if let Some(record) = inner.record.as_mut() {
                record.actions.push(RemediationAction::ManualInterventionRequired);
            }
            inner.history.push(RemediationAction::ManualInterventionRequired);
            warn!(boundary = %self.name, "Host integration fault surfaced for manual handling");
            self.emit(names::RECOVERY_TERMINAL, category, inner.retry_count, &[]);
            return Step::Finished(RecoveryOutcome::Terminal(self.report_locked(inner)));
        }

        if inner.retry_count + 1 >= self.config.max_retry_attempts {
            Self::apply(inner, RecoveryRequest::BudgetExhausted);
            error!(
                boundary = %self.name,
                retry_count = inner.retry_count,
                max = self.config.max_retry_attempts,
                "Retry budget exhausted"
            );
            self.emit(names::RECOVERY_TERMINAL, category, inner.retry_count, &[]);
            return Step::Finished(RecoveryOutcome::Terminal(self.report_locked(inner)));
        }

        if !self.config.auto_recover {
            return Step::Finished(RecoveryOutcome::AwaitingRetry(self.report_locked(inner)));
        }

        Self::apply(inner, RecoveryRequest::BeginRecovery);
        Step::Recover {
            epoch: inner.epoch,
            token: inner.cancel.clone(),
        }
    }

    async fn proceed(&self, step: Step, category: FailureCategory) -> RecoveryOutcome {
        let outcome = match step {
            Step::Finished(outcome) => outcome,
            Step::Recover { epoch, token } => self.run_recovery(category, epoch, token).await,
        };
        self.notify(&outcome);
        outcome
    }

    async fn run_recovery(
        &self,
        category: FailureCategory,
        epoch: u64,
        token: CancellationToken,
    ) -> RecoveryOutcome {
        let actions = remediation::plan(category);
        self.emit(
            names::RECOVERY_REMEDIATION,
            category,
            self.retry_count(),
            actions,
        );
        info!(boundary = %self.name, category = category.label(), ?actions, "Running remediation");

        let remediator = Remediator {
            services: &self.services,
            stores: &self.stores,
            cancel: token.clone(),
            restart_delay: self.config.telemetry_restart_delay(),
            restart: Arc::clone(&self.restart),
        };
        let (applied, failure) = remediator.apply_all(actions);

        {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch {
                return RecoveryOutcome::Cancelled;
            }
            if let Some(record) = inner.record.as_mut() {
                record.actions.extend(applied.iter().copied());
            }
            inner.history.extend(applied.iter().copied());

            if let Some(err) = failure {
                error!(boundary = %self.name, error = %err, "Remediation failed");
                if let Some(record) = inner.record.as_mut() {
                    record.error = format!("{}; {err}", record.error);
                }
                Self::apply(&mut inner, RecoveryRequest::RemediationFailed);
                self.emit(names::RECOVERY_TERMINAL, category, inner.retry_count, &[]);
                return RecoveryOutcome::Terminal(self.report_locked(&inner));
            }
        }

        tokio::select! {
            _ = token.cancelled() => {
                debug!(boundary = %self.name, "Settle delay cancelled");
                return RecoveryOutcome::Cancelled;
            }
            _ = tokio::time::sleep(self.config.settle_delay()) => {}
        }

        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return RecoveryOutcome::Cancelled;
        }
        inner.retry_count += 1;
        Self::apply(&mut inner, RecoveryRequest::RemediationSucceeded);
        let report = self.report_locked(&inner);
        inner.record = None;
        info!(
            boundary = %self.name,
            retry_count = inner.retry_count,
            "Boundary recovered; caller may retry"
        );
        self.emit(names::RECOVERY_RECOVERED, category, inner.retry_count, &[]);
        RecoveryOutcome::Recovered(report)
    }

    fn apply(inner: &mut BoundaryState, request: RecoveryRequest) -> bool {
        match RecoveryGraph::transition(inner.state, request) {
            Some(next) => {
                inner.state = next;
                true
            }
            None => false,
        }
    }

    fn report_locked(&self, inner: &BoundaryState) -> FailureReport {
        let category = inner.record.as_ref().map(|record| record.category);
        FailureReport {
            boundary: self.name.clone(),
            state: inner.state,
            category,
            error: inner.record.as_ref().map(|record| record.error.clone()),
            message: category
                .map(FailureCategory::user_message)
                .unwrap_or("No outstanding failure.")
                .to_string(),
            actions: inner.history.clone(),
            retry_count: inner.retry_count,
            max_retry_attempts: self.config.max_retry_attempts,
        }
    }

    fn emit(
        &self,
        name: &str,
        category: FailureCategory,
        retry_count: u32,
        actions: &[RemediationAction],
    ) {
        let mut event = MetricEvent::new(name, f64::from(retry_count))
            .with_tag(tags::RECOVERY)
            .with_tag(category.tag())
            .with_meta("boundary", self.name.clone())
            .with_meta("boundary_id", self.id.to_string())
            .with_meta("retry_count", retry_count);
        if !actions.is_empty() {
            let described: Vec<&str> = actions.iter().map(|action| action.describe()).collect();
            event = event.with_meta("actions", described);
        }
        self.services.telemetry().record_metric(event);
    }

    fn notify(&self, outcome: &RecoveryOutcome) {
        let Some(report) = outcome.report() else {
            return;
        };
        let observers = self.observers.lock().clone();
        for observer in observers {
            observer(report);
        }
    }
}

impl Drop for RecoveryOrchestrator {
    fn drop(&mut self) {
        self.inner.get_mut().cancel.cancel();
        if self.restart.take() {
            self.services.telemetry().start_monitoring();
        }
    }
}
