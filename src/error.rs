use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while compiling or executing a workflow.
///
/// Configuration-time variants (`UnknownStepType`, `UnknownFunction`,
/// `Configuration`, `MissingParameter`) are returned to the caller before any
/// step runs. Run-time variants (`StepFailed`, `Timeout`) are recovered by
/// the engine into failed [`StepResult`](crate::StepResult)s and never escape
/// [`WorkflowEngine::execute`](crate::WorkflowEngine::execute).
///
/// # Non-Exhaustive
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code. When matching
/// on this error, always include a wildcard pattern:
///
/// ```
/// use stepflow::WorkflowError;
///
/// fn handle_error(error: WorkflowError) {
///     match error {
///         WorkflowError::UnknownStepType(tag) => {
///             eprintln!("no step type registered for '{tag}'");
///         }
///         WorkflowError::StepFailed { step_name, details } => {
///             eprintln!("step {step_name} failed: {details}");
///         }
///         _ => eprintln!("workflow error: {error}"),
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WorkflowError {
    /// A step configuration names a type tag with no registered constructor.
    #[error("unknown step type: '{0}'")]
    UnknownStepType(String),

    /// A function step names a callable that is not in the function registry.
    #[error("unknown function: '{0}'")]
    UnknownFunction(String),

    /// The workflow configuration is invalid.
    ///
    /// Carries the joined error messages of the failed validation.
    #[error("invalid workflow configuration: {0}")]
    Configuration(String),

    /// A step configuration is missing a required key.
    #[error("step '{step_name}' is missing required parameter '{key}'")]
    MissingParameter {
        /// The step whose configuration is incomplete
        step_name: String,
        /// The missing configuration key
        key: String,
    },

    /// A step failed during execution.
    #[error("step '{step_name}' failed: {details}")]
    StepFailed {
        /// The name of the step that failed
        step_name: String,
        /// Details about the failure
        details: String,
    },

    /// A step exceeded its configured timeout.
    #[error("step '{step_name}' timed out after {timeout:?}")]
    Timeout {
        /// The name of the step that timed out
        step_name: String,
        /// The timeout that was exceeded
        timeout: Duration,
    },

    /// A workflow run finished in a failed state.
    ///
    /// Passed to `on_error` hooks; summarizes the first recorded failure.
    #[error("workflow '{workflow_id}' failed: {details}")]
    ExecutionFailed {
        /// The id of the failed run
        workflow_id: String,
        /// The first recorded failure message
        details: String,
    },

    /// An I/O error while loading or saving a configuration file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = WorkflowError::UnknownStepType("shell".to_string());
        assert_eq!(error.to_string(), "unknown step type: 'shell'");

        let error = WorkflowError::StepFailed {
            step_name: "fetch".to_string(),
            details: "connection refused".to_string(),
        };
        assert_eq!(error.to_string(), "step 'fetch' failed: connection refused");

        let error = WorkflowError::Timeout {
            step_name: "fetch".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(error.to_string(), "step 'fetch' timed out after 30s");
    }

    #[test]
    fn test_missing_parameter_display() {
        let error = WorkflowError::MissingParameter {
            step_name: "notify".to_string(),
            key: "function".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "step 'notify' is missing required parameter 'function'"
        );
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json")
            .map(|_| ())
            .map_err(WorkflowError::from);
        assert!(matches!(parse_err, Err(WorkflowError::Serialization(_))));
    }
}
