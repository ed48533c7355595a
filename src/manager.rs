use crate::config::{StepConfig, WorkflowConfig};
use crate::data::WorkflowData;
use crate::engine::{ExecutionOptions, WorkflowEngine};
use crate::error::WorkflowError;
use crate::execution::{WorkflowExecution, WorkflowStatus};
use crate::registry::{FunctionRegistry, StepRegistry};
use crate::step::{FunctionStep, WorkflowStep};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default cap on retained past executions.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Aggregate counters derived from the execution history.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionStats {
    /// Number of executions currently in history.
    pub total_executions: usize,
    /// Executions that completed successfully.
    pub successful_executions: usize,
    /// Executions that failed.
    pub failed_executions: usize,
    /// Fraction of successful executions; `0.0` for an empty history.
    pub success_rate: f64,
    /// Mean wall-clock run time across history.
    pub average_execution_time: Duration,
    /// Number of registered step types.
    pub registered_step_types: usize,
}

/// The orchestration layer over the engine and registries.
///
/// A manager compiles [`WorkflowConfig`]s into live step instances through
/// its [`StepRegistry`], delegates execution to its [`WorkflowEngine`], and
/// keeps a bounded in-memory history of past executions. It also carries the
/// [`FunctionRegistry`] that `"function"` steps resolve their callables
/// from; the `"function"` step type is pre-registered.
///
/// There is no process-wide singleton: the application constructs a manager
/// and passes it wherever it is needed.
///
/// # Examples
///
/// ```
/// use stepflow::{StepConfig, WorkflowConfig, WorkflowManager};
/// use serde_json::{json, Map, Value};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), stepflow::WorkflowError> {
/// let manager = WorkflowManager::new();
/// manager.register_function("echo", |data, params| {
///     let msg = params.get("msg").cloned().unwrap_or(Value::Null);
///     let key = params
///         .get("key")
///         .and_then(Value::as_str)
///         .unwrap_or("echo")
///         .to_string();
///     data.set(key, msg);
///     Ok(Value::Null)
/// });
///
/// let config = WorkflowConfig::builder("demo")
///     .step(
///         StepConfig::new("a", "function")
///             .with_function("echo")
///             .with_param("key", json!("a"))
///             .with_param("msg", json!("hi")),
///     )
///     .build()?;
///
/// let execution = manager.execute_workflow(&config, Map::new(), None).await?;
/// assert!(execution.is_success());
/// assert_eq!(execution.data.get("a"), Some(json!("hi")));
/// # Ok(())
/// # }
/// ```
pub struct WorkflowManager {
    engine: WorkflowEngine,
    steps: StepRegistry,
    functions: Arc<FunctionRegistry>,
    history: Mutex<VecDeque<Arc<WorkflowExecution>>>,
    history_limit: usize,
}

impl Default for WorkflowManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WorkflowManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowManager")
            .field("step_types", &self.steps.available_types())
            .field("functions", &self.functions.names())
            .field("history_len", &self.history_len())
            .field("history_limit", &self.history_limit)
            .finish()
    }
}

impl WorkflowManager {
    /// Creates a manager with a default engine and the `"function"` step
    /// type pre-registered.
    pub fn new() -> Self {
        let mut manager = Self {
            engine: WorkflowEngine::new(),
            steps: StepRegistry::new(),
            functions: Arc::new(FunctionRegistry::new()),
            history: Mutex::new(VecDeque::new()),
            history_limit: DEFAULT_HISTORY_LIMIT,
        };
        manager.register_builtin_types();
        manager
    }

    /// Replaces the engine, keeping registrations and history.
    pub fn with_engine(mut self, engine: WorkflowEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Sets the history cap; oldest entries are evicted past it.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    fn register_builtin_types(&mut self) {
        let functions = Arc::clone(&self.functions);
        self.steps.register("function", move |config: &StepConfig| {
            let function_name = config
                .function
                .as_deref()
                .or_else(|| config.config.get("function").and_then(Value::as_str))
                .ok_or_else(|| WorkflowError::MissingParameter {
                    step_name: config.name.clone(),
                    key: "function".to_string(),
                })?;
            let function = functions.resolve(function_name)?;

            let mut step = FunctionStep::new(&config.name, function)
                .with_description(&config.description)
                .with_params(config.config.clone())
                .with_retries(config.retry_count);
            if let Some(timeout) = config.timeout_duration() {
                step = step.with_timeout(timeout);
            }
            Ok(Arc::new(step) as Arc<dyn WorkflowStep>)
        });
    }

    /// Registers a step type constructor.
    pub fn register_step_type<F>(&mut self, type_tag: impl Into<String>, constructor: F)
    where
        F: Fn(&StepConfig) -> Result<Arc<dyn WorkflowStep>, WorkflowError> + Send + Sync + 'static,
    {
        let type_tag = type_tag.into();
        info!("registered step type '{type_tag}'");
        self.steps.register(type_tag, constructor);
    }

    /// Registers a callable for `"function"` steps to invoke by name.
    pub fn register_function<F>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(&WorkflowData, &Map<String, Value>) -> Result<Value, WorkflowError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        info!("registered function '{name}'");
        self.functions.register(name, function);
    }

    /// Returns the registered step type tags, sorted.
    pub fn step_types(&self) -> Vec<String> {
        self.steps.available_types()
    }

    /// Returns the registered function names, sorted.
    pub fn function_names(&self) -> Vec<String> {
        self.functions.names()
    }

    /// Returns a shared reference to the engine.
    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    /// Returns a mutable reference to the engine, e.g. to register hooks.
    pub fn engine_mut(&mut self) -> &mut WorkflowEngine {
        &mut self.engine
    }

    /// Compiles a configuration into runtime step instances.
    ///
    /// Disabled steps are skipped. Fails fast, before any step executes,
    /// when validation reports errors, a step's type tag is unregistered, or
    /// a function step's callable cannot be resolved.
    pub fn compile(
        &self,
        config: &WorkflowConfig,
    ) -> Result<Vec<Arc<dyn WorkflowStep>>, WorkflowError> {
        let report = config.validate();
        if !report.is_valid() {
            return Err(WorkflowError::Configuration(report.errors.join("; ")));
        }

        let mut steps = Vec::new();
        for step_config in &config.steps {
            if !step_config.enabled {
                debug!("skipping disabled step '{}'", step_config.name);
                continue;
            }
            steps.push(self.steps.create(step_config)?);
        }
        Ok(steps)
    }

    /// Compiles and executes a workflow configuration.
    ///
    /// The data bag is seeded from the configuration's `variables`, then
    /// overlaid with `input`. When `workflow_id` is `None`, an id of the form
    /// `<name>_<timestamp>` is generated. The resulting execution is
    /// recorded into history unconditionally, even on failure, and
    /// returned.
    ///
    /// # Errors
    ///
    /// Only configuration-time failures surface here (invalid config,
    /// unknown step type or function, no enabled steps). Step failures do
    /// not: inspect the returned execution's status instead.
    pub async fn execute_workflow(
        &self,
        config: &WorkflowConfig,
        input: Map<String, Value>,
        workflow_id: Option<String>,
    ) -> Result<Arc<WorkflowExecution>, WorkflowError> {
        let steps = self.compile(config)?;
        if steps.is_empty() {
            return Err(WorkflowError::Configuration(format!(
                "workflow '{}' has no enabled steps",
                config.name
            )));
        }

        let report = self.engine.validate_workflow(&steps);
        for warning in &report.warnings {
            warn!("workflow '{}': {warning}", config.name);
        }

        let workflow_id = workflow_id.unwrap_or_else(|| {
            format!("{}_{}", config.name, Utc::now().format("%Y%m%d_%H%M%S%3f"))
        });

        let data = WorkflowData::from_map(config.variables.clone());
        data.update(input);

        let options = ExecutionOptions::from(&config.settings);
        let execution = Arc::new(
            self.engine
                .execute_with(&steps, data, workflow_id, options)
                .await,
        );
        self.record_execution(Arc::clone(&execution));
        Ok(execution)
    }

    fn record_execution(&self, execution: Arc<WorkflowExecution>) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push_back(execution);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    /// Returns the recorded execution with the given id, newest match first.
    pub fn get_execution(&self, workflow_id: &str) -> Option<Arc<WorkflowExecution>> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|execution| execution.workflow_id == workflow_id)
            .cloned()
    }

    /// Returns all recorded executions, oldest first.
    pub fn list_executions(&self) -> Vec<Arc<WorkflowExecution>> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Returns the number of recorded executions.
    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Drops all recorded executions.
    pub fn clear_history(&self) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Keeps only the `keep_last` most recent executions.
    pub fn cleanup_history(&self, keep_last: usize) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        while history.len() > keep_last {
            history.pop_front();
        }
    }

    /// Derives aggregate counters by scanning history.
    ///
    /// O(history size), which the history cap keeps acceptable.
    pub fn get_statistics(&self) -> ExecutionStats {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());

        let total = history.len();
        let successful = history.iter().filter(|e| e.is_success()).count();
        let failed = history
            .iter()
            .filter(|e| e.status == WorkflowStatus::Failed)
            .count();
        let average = if total == 0 {
            Duration::ZERO
        } else {
            history.iter().map(|e| e.execution_time()).sum::<Duration>() / total as u32
        };

        ExecutionStats {
            total_executions: total,
            successful_executions: successful,
            failed_executions: failed,
            success_rate: if total == 0 {
                0.0
            } else {
                successful as f64 / total as f64
            },
            average_execution_time: average,
            registered_step_types: self.steps.len(),
        }
    }
}
