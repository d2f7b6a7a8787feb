//! Experiment state machine.
//!
//! `PENDING | REPROCESS → PROCESSING → COMPLETED | FAILED`, plus the
//! launch-failure edge straight to `FAILED` and the two administrative
//! resets (`FAILED → PENDING`, `COMPLETED → REPROCESS`).
//!
//! `resolve()` is pure: given the status an experiment is in and what
//! happened to its evaluation, it returns the status and metrics to write.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OutputError;

/// Lifecycle status of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentStatus {
    /// New submission waiting for evaluation.
    Pending,
    /// Re-evaluation requested by an administrator.
    Reprocess,
    /// Evaluator launched, waiting for it to exit.
    Processing,
    /// Evaluated successfully; metrics are meaningful.
    Completed,
    /// Evaluation could not be produced.
    Failed,
}

/// Statuses the worker claims from, in one FIFO set.
pub const CLAIMABLE: &[ExperimentStatus] =
    &[ExperimentStatus::Pending, ExperimentStatus::Reprocess];

impl ExperimentStatus {
    pub const ALL: [ExperimentStatus; 5] = [
        Self::Pending,
        Self::Reprocess,
        Self::Processing,
        Self::Completed,
        Self::Failed,
    ];

    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: ExperimentStatus) -> bool {
        use ExperimentStatus::*;

        matches!(
            (self, target),
            // Claim: launch succeeded, or failed before/at launch
            (Pending, Processing) | (Pending, Failed) |
            (Reprocess, Processing) | (Reprocess, Failed) |
            // Exit observed
            (Processing, Completed) | (Processing, Failed) |
            // Administrative resets
            (Failed, Pending) | (Completed, Reprocess)
        )
    }

    /// Whether the worker may claim an experiment in this state.
    pub fn is_claimable(&self) -> bool {
        CLAIMABLE.contains(self)
    }

    /// Terminal with respect to the worker.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Database / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Reprocess => "REPROCESS",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown experiment status: {s}"))
    }
}

/// The three scores produced by the evaluator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Matching score.
    pub ms: f64,
    /// Matching accuracy.
    pub ma: f64,
    /// Matching rate / repeatability.
    pub mr: f64,
}

impl Metrics {
    pub fn new(ms: f64, ma: f64, mr: f64) -> Self {
        Self { ms, ma, mr }
    }
}

/// Why an experiment ended up `FAILED`.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// Dataset label has no directory mapping.
    UnknownDataset { label: String },
    /// Input artifact could not be resolved, fetched, or staged.
    Transfer(String),
    /// Evaluator process could not start.
    Launch(String),
    /// Evaluator exited non-zero.
    Execution { code: i32 },
    /// Exit 0 but the output artifact broke its contract.
    Output(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownDataset { label } => write!(f, "dataset {label:?} has no mapping"),
            Self::Transfer(reason) => write!(f, "input transfer failed: {reason}"),
            Self::Launch(reason) => write!(f, "evaluator launch failed: {reason}"),
            Self::Execution { code } => write!(f, "evaluator exited with code {code}"),
            Self::Output(reason) => write!(f, "output contract violated: {reason}"),
        }
    }
}

/// What happened to one evaluation attempt.
#[derive(Debug)]
pub enum EvaluationOutcome {
    /// Failed before any launch attempt (dataset mapping, transfer).
    Aborted(FailureReason),
    /// The evaluator process never started.
    LaunchFailed { reason: String },
    /// The evaluator exited with a non-zero code.
    NonZeroExit { code: i32 },
    /// The evaluator exited with code 0; `output` is the parsed artifact.
    CleanExit { output: Result<Metrics, OutputError> },
}

/// The status (and metrics, on success) an outcome resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub status: ExperimentStatus,
    /// Only set for `COMPLETED`.
    pub metrics: Option<Metrics>,
    /// Only set for `FAILED`.
    pub failure: Option<FailureReason>,
}

impl Resolution {
    fn completed(metrics: Metrics) -> Self {
        Self {
            status: ExperimentStatus::Completed,
            metrics: Some(metrics),
            failure: None,
        }
    }

    fn failed(reason: FailureReason) -> Self {
        Self {
            status: ExperimentStatus::Failed,
            metrics: None,
            failure: Some(reason),
        }
    }
}

/// An outcome that does not apply to the experiment's current status.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot move experiment from {from} to {to}")]
pub struct TransitionError {
    pub from: ExperimentStatus,
    pub to: ExperimentStatus,
}

/// Check a single edge of the state machine.
pub fn transition(
    from: ExperimentStatus,
    to: ExperimentStatus,
) -> Result<ExperimentStatus, TransitionError> {
    if from.can_transition_to(to) {
        Ok(to)
    } else {
        Err(TransitionError { from, to })
    }
}

/// Resolve an evaluation outcome against the experiment's current status.
///
/// Pre-launch failures and launch failures apply to a claimable experiment
/// and bypass `PROCESSING`; exit outcomes apply to `PROCESSING` only.
pub fn resolve(
    current: ExperimentStatus,
    outcome: EvaluationOutcome,
) -> Result<Resolution, TransitionError> {
    let from_processing = matches!(
        outcome,
        EvaluationOutcome::NonZeroExit { .. } | EvaluationOutcome::CleanExit { .. }
    );

    let resolution = match outcome {
        EvaluationOutcome::Aborted(reason) => Resolution::failed(reason),
        EvaluationOutcome::LaunchFailed { reason } => {
            Resolution::failed(FailureReason::Launch(reason))
        }
        EvaluationOutcome::NonZeroExit { code } => {
            Resolution::failed(FailureReason::Execution { code })
        }
        EvaluationOutcome::CleanExit { output: Ok(metrics) } => Resolution::completed(metrics),
        EvaluationOutcome::CleanExit { output: Err(e) } => {
            Resolution::failed(FailureReason::Output(e.to_string()))
        }
    };

    let precondition_ok = if from_processing {
        current == ExperimentStatus::Processing
    } else {
        current.is_claimable()
    };

    if precondition_ok && current.can_transition_to(resolution.status) {
        Ok(resolution)
    } else {
        Err(TransitionError {
            from: current,
            to: resolution.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn clean(ms: f64, ma: f64, mr: f64) -> EvaluationOutcome {
        EvaluationOutcome::CleanExit {
            output: Ok(Metrics::new(ms, ma, mr)),
        }
    }

    #[test]
    fn state_transitions_valid() {
        use ExperimentStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Reprocess.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));
        assert!(Completed.can_transition_to(Reprocess));
    }

    #[test]
    fn state_transitions_invalid() {
        use ExperimentStatus::*;
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Reprocess.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
    }

    #[test]
    fn terminal_and_claimable() {
        assert!(ExperimentStatus::Completed.is_terminal());
        assert!(ExperimentStatus::Failed.is_terminal());
        assert!(!ExperimentStatus::Processing.is_terminal());
        assert!(ExperimentStatus::Pending.is_claimable());
        assert!(ExperimentStatus::Reprocess.is_claimable());
        assert!(!ExperimentStatus::Processing.is_claimable());
        assert!(!ExperimentStatus::Failed.is_claimable());
    }

    #[test]
    fn clean_exit_with_metrics_completes() {
        let res = resolve(ExperimentStatus::Processing, clean(0.42, 0.87, 0.65)).unwrap();
        assert_eq!(res.status, ExperimentStatus::Completed);
        assert_eq!(res.metrics, Some(Metrics::new(0.42, 0.87, 0.65)));
        assert!(res.failure.is_none());
    }

    #[test]
    fn clean_exit_missing_output_fails_without_metrics() {
        let outcome = EvaluationOutcome::CleanExit {
            output: Err(OutputError::Missing {
                path: PathBuf::from("/tmp/x.out"),
            }),
        };
        let res = resolve(ExperimentStatus::Processing, outcome).unwrap();
        assert_eq!(res.status, ExperimentStatus::Failed);
        assert!(res.metrics.is_none());
        assert!(matches!(res.failure, Some(FailureReason::Output(_))));
    }

    #[test]
    fn nonzero_exit_fails_regardless_of_output() {
        let outcome = EvaluationOutcome::NonZeroExit { code: 1 };
        let res = resolve(ExperimentStatus::Processing, outcome).unwrap();
        assert_eq!(res.status, ExperimentStatus::Failed);
        assert_eq!(res.failure, Some(FailureReason::Execution { code: 1 }));
        assert!(res.metrics.is_none());
    }

    #[test]
    fn launch_failure_bypasses_processing() {
        for current in [ExperimentStatus::Pending, ExperimentStatus::Reprocess] {
            let outcome = EvaluationOutcome::LaunchFailed {
                reason: "No such file or directory".into(),
            };
            let res = resolve(current, outcome).unwrap();
            assert_eq!(res.status, ExperimentStatus::Failed);
        }
    }

    #[test]
    fn launch_failure_rejected_once_processing() {
        let outcome = EvaluationOutcome::LaunchFailed {
            reason: "late".into(),
        };
        let err = resolve(ExperimentStatus::Processing, outcome).unwrap_err();
        assert_eq!(err.from, ExperimentStatus::Processing);
    }

    #[test]
    fn unknown_dataset_fails_from_pending() {
        let outcome = EvaluationOutcome::Aborted(FailureReason::UnknownDataset {
            label: "Multi Object".into(),
        });
        let res = resolve(ExperimentStatus::Pending, outcome).unwrap();
        assert_eq!(res.status, ExperimentStatus::Failed);
    }

    #[test]
    fn exit_outcome_requires_processing() {
        let err = resolve(ExperimentStatus::Pending, clean(0.1, 0.2, 0.3)).unwrap_err();
        assert_eq!(
            err,
            TransitionError {
                from: ExperimentStatus::Pending,
                to: ExperimentStatus::Completed,
            }
        );
        assert!(resolve(ExperimentStatus::Completed, clean(0.1, 0.2, 0.3)).is_err());
    }

    #[test]
    fn transition_helper() {
        assert_eq!(
            transition(ExperimentStatus::Failed, ExperimentStatus::Pending),
            Ok(ExperimentStatus::Pending)
        );
        assert!(transition(ExperimentStatus::Failed, ExperimentStatus::Completed).is_err());
    }

    #[test]
    fn status_display_and_parse() {
        assert_eq!(ExperimentStatus::Reprocess.to_string(), "REPROCESS");
        assert_eq!("completed".parse::<ExperimentStatus>(), Ok(ExperimentStatus::Completed));
        assert!("done".parse::<ExperimentStatus>().is_err());
    }

    #[test]
    fn status_serde_uppercase() {
        let json = serde_json::to_string(&ExperimentStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
        let parsed: ExperimentStatus = serde_json::from_str("\"FAILED\"").unwrap();
        assert_eq!(parsed, ExperimentStatus::Failed);
    }
}
