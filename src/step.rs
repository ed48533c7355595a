use crate::data::WorkflowData;
use crate::error::WorkflowError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Success payload a step hands back from [`WorkflowStep::execute`].
///
/// The engine folds this into the step's recorded
/// [`StepResult`](crate::StepResult): `message` becomes the result message,
/// `metadata` its diagnostic entries. Failure is not expressed here; a step
/// fails by returning `Err`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    /// Optional human-readable outcome message.
    pub message: Option<String>,
    /// Free-form diagnostic entries.
    pub metadata: Map<String, Value>,
}

impl StepOutput {
    /// An empty success payload.
    pub fn done() -> Self {
        Self::default()
    }

    /// A success payload with an outcome message.
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            metadata: Map::new(),
        }
    }

    /// A success payload carrying a returned value under the `"output"`
    /// metadata key.
    pub fn with_value(value: Value) -> Self {
        let mut metadata = Map::new();
        metadata.insert("output".to_string(), value);
        Self {
            message: None,
            metadata,
        }
    }
}

/// A unit of work in a workflow.
///
/// Implementations read and write the shared [`WorkflowData`] bag and signal
/// failure by returning `Err`; the engine converts it into a failed result
/// rather than letting it abort the run. A step must tolerate missing
/// optional keys via defaults, and must not assume exclusive access to the
/// bag: in parallel mode several steps execute concurrently against the same
/// instance.
///
/// # Examples
///
/// ```
/// use stepflow::{StepOutput, WorkflowData, WorkflowError, WorkflowStep};
/// use async_trait::async_trait;
/// use serde_json::json;
///
/// #[derive(Debug)]
/// struct AnnotateStep;
///
/// #[async_trait]
/// impl WorkflowStep for AnnotateStep {
///     fn name(&self) -> &str {
///         "annotate"
///     }
///
///     async fn execute(&self, data: &WorkflowData) -> Result<StepOutput, WorkflowError> {
///         let topic = data.get_or("topic", json!("unknown"));
///         data.set("annotation", json!(format!("about {topic}")));
///         Ok(StepOutput::done())
///     }
///
///     fn output_keys(&self) -> Vec<String> {
///         vec!["annotation".to_string()]
///     }
/// }
/// ```
#[async_trait]
pub trait WorkflowStep: Send + Sync {
    /// Returns the step name, unique within its workflow.
    fn name(&self) -> &str;

    /// Returns a human-readable description of the step.
    fn description(&self) -> &str {
        ""
    }

    /// Executes the step against the shared data bag.
    async fn execute(&self, data: &WorkflowData) -> Result<StepOutput, WorkflowError>;

    /// Cheap, synchronous guard checked before execution.
    ///
    /// Returning `false` records the step as skipped without invoking
    /// [`execute`](Self::execute); subsequent steps still run.
    fn can_execute(&self, _data: &WorkflowData) -> bool {
        true
    }

    /// Bag keys this step expects earlier steps to have produced.
    ///
    /// Feeds the engine's pre-flight validation; not enforced at run time.
    fn required_inputs(&self) -> Vec<String> {
        Vec::new()
    }

    /// Bag keys this step writes.
    fn output_keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Deadline for one execution attempt; `None` means no timeout.
    ///
    /// Enforcement is cooperative: the attempt is abandoned at its next
    /// await point and recorded as failed with a timeout error.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Number of times a failed attempt is retried before the step is
    /// recorded as failed.
    fn retry_count(&self) -> u32 {
        0
    }
}

/// Signature of a callable a [`FunctionStep`] invokes.
///
/// Receives the shared data bag and the parameters bound in the step's
/// configuration. A non-null returned value is recorded in the step result's
/// metadata under `"output"`.
pub type StepFunction =
    dyn Fn(&WorkflowData, &Map<String, Value>) -> Result<Value, WorkflowError> + Send + Sync;

/// A step that invokes a named callable from the function registry.
///
/// This is the workhorse step type for configuration-driven workflows: the
/// configuration names a function, the manager resolves it at compile time,
/// and at execute time the callable runs with the bag and its bound
/// parameters.
pub struct FunctionStep {
    name: String,
    description: String,
    function: Arc<StepFunction>,
    params: Map<String, Value>,
    timeout: Option<Duration>,
    retry_count: u32,
}

impl FunctionStep {
    /// Creates a function step around a resolved callable.
    pub fn new(name: impl Into<String>, function: Arc<StepFunction>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            function,
            params: Map::new(),
            timeout: None,
            retry_count: 0,
        }
    }

    /// Creates a function step directly from a closure.
    pub fn from_fn<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&WorkflowData, &Map<String, Value>) -> Result<Value, WorkflowError>
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, Arc::new(function))
    }

    /// Sets the step description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Binds the parameters passed to the callable on every invocation.
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets how many times a failed attempt is retried.
    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

impl fmt::Debug for FunctionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionStep")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("params", &self.params)
            .field("timeout", &self.timeout)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}

#[async_trait]
impl WorkflowStep for FunctionStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, data: &WorkflowData) -> Result<StepOutput, WorkflowError> {
        let value = (self.function)(data, &self.params)?;
        Ok(match value {
            Value::Null => StepOutput::done(),
            value => StepOutput::with_value(value),
        })
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn retry_count(&self) -> u32 {
        self.retry_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_function_step_executes_callable() {
        let step = FunctionStep::from_fn("greet", |data, params| {
            let name = params
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("world");
            data.set("greeting", json!(format!("hello, {name}")));
            Ok(Value::Null)
        })
        .with_params({
            let mut params = Map::new();
            params.insert("name".to_string(), json!("stepflow"));
            params
        });

        let data = WorkflowData::new();
        let output = step.execute(&data).await.expect("step succeeds");

        assert_eq!(output, StepOutput::done());
        assert_eq!(data.get("greeting"), Some(json!("hello, stepflow")));
    }

    #[tokio::test]
    async fn test_function_step_records_returned_value() {
        let step = FunctionStep::from_fn("compute", |_data, _params| Ok(json!(42)));

        let data = WorkflowData::new();
        let output = step.execute(&data).await.expect("step succeeds");

        assert_eq!(output.metadata.get("output"), Some(&json!(42)));
    }

    #[tokio::test]
    async fn test_function_step_propagates_error() {
        let step = FunctionStep::from_fn("broken", |_data, _params| {
            Err(WorkflowError::StepFailed {
                step_name: "broken".to_string(),
                details: "boom".to_string(),
            })
        });

        let data = WorkflowData::new();
        let result = step.execute(&data).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_function_step_configuration() {
        let step = FunctionStep::from_fn("configured", |_data, _params| Ok(Value::Null))
            .with_description("a configured step")
            .with_timeout(Duration::from_secs(5))
            .with_retries(2);

        assert_eq!(step.name(), "configured");
        assert_eq!(step.description(), "a configured step");
        assert_eq!(step.timeout(), Some(Duration::from_secs(5)));
        assert_eq!(step.retry_count(), 2);
    }

    #[test]
    fn test_step_output_constructors() {
        assert_eq!(StepOutput::done(), StepOutput::default());

        let output = StepOutput::with_message("all good");
        assert_eq!(output.message.as_deref(), Some("all good"));

        let output = StepOutput::with_value(json!("data"));
        assert_eq!(output.metadata.get("output"), Some(&json!("data")));
    }
}
