use crate::data::WorkflowData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Lifecycle state of a single step within one execution.
///
/// Steps move `Pending → Running → {Completed | Failed | Skipped}`; the
/// terminal states never transition further within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Never executed (guard returned false, or an upstream step failed).
    Skipped,
}

impl StepStatus {
    /// Returns `true` for states a step never leaves within one execution.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        write!(f, "{label}")
    }
}

/// Overall state of one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Created but not yet started.
    Pending,
    /// Steps are executing.
    Running,
    /// Every executed step completed.
    Completed,
    /// At least one step failed, or the run itself failed.
    Failed,
    /// The run was abandoned before finishing.
    Cancelled,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

/// Outcome record of one step execution.
///
/// The constructors uphold the status invariants: a completed result never
/// carries an error, a failed result always does, and a skipped result
/// carries its reason as the message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    /// Name of the step this result belongs to.
    pub step_name: String,
    /// Final status of the step.
    pub status: StepStatus,
    /// Optional human-readable outcome message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure details; present exactly when `status` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock time the step spent executing, across all attempts.
    pub execution_time: Duration,
    /// Free-form diagnostic entries attached by the step.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl StepResult {
    /// Creates a successful result.
    pub fn completed(step_name: impl Into<String>, execution_time: Duration) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Completed,
            message: None,
            error: None,
            execution_time,
            metadata: Map::new(),
        }
    }

    /// Creates a failed result carrying the error details.
    pub fn failed(
        step_name: impl Into<String>,
        error: impl Into<String>,
        execution_time: Duration,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Failed,
            message: None,
            error: Some(error.into()),
            execution_time,
            metadata: Map::new(),
        }
    }

    /// Creates a skipped result; the reason lands in `message`.
    pub fn skipped(step_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Skipped,
            message: Some(reason.into()),
            error: None,
            execution_time: Duration::ZERO,
            metadata: Map::new(),
        }
    }

    /// Returns `true` if the step completed successfully.
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Completed
    }

    /// Returns `true` if the step failed.
    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// The record of one workflow run.
///
/// Created by the engine at the start of `execute`, mutated only by the
/// engine while the run is in flight, and frozen (`finished_at` set) at
/// completion. The manager stores frozen executions in its bounded history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecution {
    /// Unique id of this run, e.g. `<workflow-name>_<timestamp>`.
    pub workflow_id: String,
    /// Overall status of the run.
    pub status: WorkflowStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished; `None` while in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Per-step results in the order they were recorded.
    pub step_results: Vec<StepResult>,
    /// Top-level error; set when the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The data bag in its final state.
    pub data: WorkflowData,
}

impl WorkflowExecution {
    /// Creates a pending execution record for the given run id.
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            status: WorkflowStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            step_results: Vec::new(),
            error: None,
            data: WorkflowData::new(),
        }
    }

    /// Appends a step result.
    ///
    /// A failed result flips the run to `Failed`; the first failure's error
    /// becomes the run's top-level error.
    pub fn record(&mut self, result: StepResult) {
        if result.is_failed() {
            self.status = WorkflowStatus::Failed;
            if self.error.is_none() {
                self.error = result
                    .error
                    .clone()
                    .or_else(|| Some(format!("step '{}' failed", result.step_name)));
            }
        }
        self.step_results.push(result);
    }

    /// Marks the run as failed with a top-level error.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = WorkflowStatus::Failed;
        self.error = Some(error.into());
    }

    /// Freezes the record: sets `finished_at` and resolves a still-running
    /// run to `Completed`.
    pub fn complete(&mut self) {
        self.finished_at = Some(Utc::now());
        if matches!(
            self.status,
            WorkflowStatus::Running | WorkflowStatus::Pending
        ) {
            self.status = WorkflowStatus::Completed;
        }
    }

    /// Returns the total wall-clock time of the run.
    ///
    /// For an unfinished run, measures up to the current instant.
    pub fn execution_time(&self) -> Duration {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Returns the result recorded for the given step name.
    pub fn step_result(&self, step_name: &str) -> Option<&StepResult> {
        self.step_results.iter().find(|r| r.step_name == step_name)
    }

    /// Returns the number of steps that completed successfully.
    pub fn completed_steps(&self) -> usize {
        self.step_results.iter().filter(|r| r.is_success()).count()
    }

    /// Returns the fraction of recorded steps that completed successfully.
    pub fn progress(&self) -> f64 {
        if self.step_results.is_empty() {
            return 1.0;
        }
        self.completed_steps() as f64 / self.step_results.len() as f64
    }

    /// Returns `true` if the run completed without failure.
    pub fn is_success(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_constructors_uphold_invariants() {
        let ok = StepResult::completed("a", Duration::from_millis(5));
        assert_eq!(ok.status, StepStatus::Completed);
        assert!(ok.error.is_none());
        assert!(ok.is_success());

        let failed = StepResult::failed("b", "boom", Duration::from_millis(5));
        assert_eq!(failed.status, StepStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.is_failed());

        let skipped = StepResult::skipped("c", "precondition not met");
        assert_eq!(skipped.status, StepStatus::Skipped);
        assert_eq!(skipped.message.as_deref(), Some("precondition not met"));
        assert!(skipped.error.is_none());
        assert_eq!(skipped.execution_time, Duration::ZERO);
    }

    #[test]
    fn test_step_status_terminal() {
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(StepStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(StepStatus::Completed.to_string(), "completed");
        assert_eq!(WorkflowStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_record_failure_sets_run_status() {
        let mut execution = WorkflowExecution::new("run_1");
        execution.status = WorkflowStatus::Running;

        execution.record(StepResult::completed("a", Duration::ZERO));
        assert_eq!(execution.status, WorkflowStatus::Running);

        execution.record(StepResult::failed("b", "boom", Duration::ZERO));
        assert_eq!(execution.status, WorkflowStatus::Failed);
        assert_eq!(execution.error.as_deref(), Some("boom"));

        // A later failure does not overwrite the first error.
        execution.record(StepResult::failed("c", "other", Duration::ZERO));
        assert_eq!(execution.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_complete_resolves_running_to_completed() {
        let mut execution = WorkflowExecution::new("run_1");
        execution.status = WorkflowStatus::Running;
        execution.complete();

        assert_eq!(execution.status, WorkflowStatus::Completed);
        assert!(execution.finished_at.is_some());
        assert!(execution.is_success());
    }

    #[test]
    fn test_complete_preserves_failure() {
        let mut execution = WorkflowExecution::new("run_1");
        execution.status = WorkflowStatus::Running;
        execution.record(StepResult::failed("a", "boom", Duration::ZERO));
        execution.complete();

        assert_eq!(execution.status, WorkflowStatus::Failed);
        assert!(!execution.is_success());
    }

    #[test]
    fn test_progress_counts_completed_steps() {
        let mut execution = WorkflowExecution::new("run_1");
        assert_eq!(execution.progress(), 1.0);

        execution.record(StepResult::completed("a", Duration::ZERO));
        execution.record(StepResult::skipped("b", "guard"));
        assert_eq!(execution.completed_steps(), 1);
        assert_eq!(execution.progress(), 0.5);
    }

    #[test]
    fn test_step_result_lookup() {
        let mut execution = WorkflowExecution::new("run_1");
        execution.record(StepResult::completed("a", Duration::ZERO));

        assert!(execution.step_result("a").is_some());
        assert!(execution.step_result("missing").is_none());
    }

    #[test]
    fn test_execution_serializes() {
        let mut execution = WorkflowExecution::new("run_1");
        execution.record(StepResult::completed("a", Duration::from_secs(1)));
        execution.complete();

        let value = serde_json::to_value(&execution).expect("serializes");
        assert_eq!(value["workflow_id"], "run_1");
        assert_eq!(value["status"], "completed");
        assert_eq!(value["step_results"][0]["step_name"], "a");
    }
}
