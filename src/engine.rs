use crate::config::{ValidationReport, WorkflowSettings};
use crate::data::WorkflowData;
use crate::error::WorkflowError;
use crate::execution::{StepResult, WorkflowExecution, WorkflowStatus};
use crate::step::WorkflowStep;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Options controlling how one run executes its steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Dispatch all steps concurrently instead of in order.
    pub parallel: bool,
    /// Upper bound on concurrently executing steps in parallel mode.
    pub max_workers: usize,
    /// In sequential mode, halt the run at the first failed step.
    pub stop_on_error: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            max_workers: 4,
            stop_on_error: true,
        }
    }
}

impl From<&WorkflowSettings> for ExecutionOptions {
    fn from(settings: &WorkflowSettings) -> Self {
        Self {
            parallel: settings.parallel_execution,
            max_workers: settings.max_workers,
            stop_on_error: settings.stop_on_error,
        }
    }
}

type BeforeStepHook =
    dyn Fn(&dyn WorkflowStep, &WorkflowData, &WorkflowExecution) -> Result<(), WorkflowError>
        + Send
        + Sync;
type AfterStepHook =
    dyn Fn(&dyn WorkflowStep, &StepResult, &WorkflowExecution) -> Result<(), WorkflowError>
        + Send
        + Sync;
type ErrorHook = dyn Fn(&WorkflowExecution, &WorkflowError) -> Result<(), WorkflowError>
    + Send
    + Sync;
type CompleteHook = dyn Fn(&WorkflowExecution) -> Result<(), WorkflowError> + Send + Sync;

/// Non-executing description of what a run would do.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionPlan {
    /// Number of steps in the run.
    pub total_steps: usize,
    /// Whether steps would be dispatched concurrently.
    pub parallel: bool,
    /// Worker bound applied in parallel mode.
    pub max_workers: usize,
    /// Per-step details in dispatch order.
    pub steps: Vec<PlannedStep>,
}

/// One step's entry in an [`ExecutionPlan`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlannedStep {
    /// Position in the dispatch order.
    pub index: usize,
    /// Step name.
    pub name: String,
    /// Step description.
    pub description: String,
    /// Bag keys the step expects earlier steps to have produced.
    pub required_inputs: Vec<String>,
    /// Bag keys the step writes.
    pub output_keys: Vec<String>,
}

/// The workflow execution core.
///
/// Runs an ordered list of step instances against a shared [`WorkflowData`]
/// bag, records per-step results into a [`WorkflowExecution`], and invokes
/// lifecycle hooks. `execute` never fails: step errors become failed results,
/// and a run that ends badly is reported through the execution's status and
/// top-level error, not through a `Result`.
///
/// # Execution modes
///
/// Sequential (default) runs steps strictly in order; every prior step's
/// writes to the bag are visible before the next step starts, which is how
/// inter-step dependencies are actually honored. Parallel mode dispatches
/// the whole batch concurrently against the *same* bag under a bounded
/// worker pool; safe only for steps writing disjoint key sets, and without
/// cross-step cancellation: every submitted step runs to completion
/// regardless of its siblings.
#[derive(Default)]
pub struct WorkflowEngine {
    defaults: ExecutionOptions,
    before_step: Vec<Box<BeforeStepHook>>,
    after_step: Vec<Box<AfterStepHook>>,
    on_error: Vec<Box<ErrorHook>>,
    on_complete: Vec<Box<CompleteHook>>,
}

impl fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("defaults", &self.defaults)
            .field("before_step_hooks", &self.before_step.len())
            .field("after_step_hooks", &self.after_step.len())
            .field("on_error_hooks", &self.on_error.len())
            .field("on_complete_hooks", &self.on_complete.len())
            .finish()
    }
}

impl WorkflowEngine {
    /// Creates an engine with default options (sequential, stop on error).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine with the given default options.
    pub fn with_options(options: ExecutionOptions) -> Self {
        Self {
            defaults: options,
            ..Self::default()
        }
    }

    /// Registers a hook invoked before each step is considered for
    /// execution.
    ///
    /// Hooks are diagnostic only: a hook returning `Err` is logged and never
    /// aborts the run.
    pub fn on_before_step<F>(&mut self, hook: F)
    where
        F: Fn(&dyn WorkflowStep, &WorkflowData, &WorkflowExecution) -> Result<(), WorkflowError>
            + Send
            + Sync
            + 'static,
    {
        self.before_step.push(Box::new(hook));
    }

    /// Registers a hook invoked after each executed step with its result.
    pub fn on_after_step<F>(&mut self, hook: F)
    where
        F: Fn(&dyn WorkflowStep, &StepResult, &WorkflowExecution) -> Result<(), WorkflowError>
            + Send
            + Sync
            + 'static,
    {
        self.after_step.push(Box::new(hook));
    }

    /// Registers a hook invoked when a run ends in failure.
    pub fn on_error<F>(&mut self, hook: F)
    where
        F: Fn(&WorkflowExecution, &WorkflowError) -> Result<(), WorkflowError>
            + Send
            + Sync
            + 'static,
    {
        self.on_error.push(Box::new(hook));
    }

    /// Registers a hook invoked once per run after the last step.
    pub fn on_complete<F>(&mut self, hook: F)
    where
        F: Fn(&WorkflowExecution) -> Result<(), WorkflowError> + Send + Sync + 'static,
    {
        self.on_complete.push(Box::new(hook));
    }

    /// Executes the steps with the engine's default options.
    pub async fn execute(
        &self,
        steps: &[Arc<dyn WorkflowStep>],
        data: WorkflowData,
        workflow_id: impl Into<String>,
    ) -> WorkflowExecution {
        self.execute_with(steps, data, workflow_id, self.defaults.clone())
            .await
    }

    /// Executes the steps with explicit options.
    ///
    /// Always returns a complete execution record: on failure the record
    /// carries the partial results of every step that ran, a `Failed`
    /// status, and the first failure as its top-level error.
    pub async fn execute_with(
        &self,
        steps: &[Arc<dyn WorkflowStep>],
        data: WorkflowData,
        workflow_id: impl Into<String>,
        options: ExecutionOptions,
    ) -> WorkflowExecution {
        let workflow_id = workflow_id.into();
        let mut execution = WorkflowExecution::new(&workflow_id);
        execution.status = WorkflowStatus::Running;
        let data = Arc::new(data);

        info!(
            "starting workflow '{}' ({} steps, {})",
            workflow_id,
            steps.len(),
            if options.parallel && steps.len() > 1 {
                "parallel"
            } else {
                "sequential"
            }
        );

        if options.parallel && steps.len() > 1 {
            self.run_parallel(steps, &data, &mut execution, &options)
                .await;
        } else {
            self.run_sequential(steps, &data, &mut execution, &options)
                .await;
        }

        if execution.status == WorkflowStatus::Failed {
            let error = WorkflowError::ExecutionFailed {
                workflow_id: workflow_id.clone(),
                details: execution
                    .error
                    .clone()
                    .unwrap_or_else(|| "workflow failed".to_string()),
            };
            for hook in &self.on_error {
                if let Err(hook_error) = hook(&execution, &error) {
                    warn!("on_error hook failed: {hook_error}");
                }
            }
        }

        for hook in &self.on_complete {
            if let Err(hook_error) = hook(&execution) {
                warn!("on_complete hook failed: {hook_error}");
            }
        }

        execution.complete();
        execution.data = Arc::try_unwrap(data).unwrap_or_else(|shared| shared.as_ref().clone());

        info!(
            "workflow '{}' finished with status {} in {:.2?}",
            workflow_id,
            execution.status,
            execution.execution_time()
        );
        execution
    }

    async fn run_sequential(
        &self,
        steps: &[Arc<dyn WorkflowStep>],
        data: &Arc<WorkflowData>,
        execution: &mut WorkflowExecution,
        options: &ExecutionOptions,
    ) {
        let mut halted_at = None;

        for (index, step) in steps.iter().enumerate() {
            self.fire_before_step(step.as_ref(), data, execution);

            if !step.can_execute(data) {
                info!("skipping step '{}': precondition not met", step.name());
                execution.record(StepResult::skipped(step.name(), "precondition not met"));
                continue;
            }

            let result = self.run_step(step, data).await;
            let failed = result.is_failed();

            execution.record(result.clone());
            self.fire_after_step(step.as_ref(), &result, execution);

            if failed && options.stop_on_error {
                halted_at = Some(index + 1);
                break;
            }
        }

        // Record trailing steps so a halted run still has a complete audit
        // trail.
        if let Some(from) = halted_at {
            for step in &steps[from..] {
                execution.record(StepResult::skipped(step.name(), "upstream failure"));
            }
        }
    }

    async fn run_parallel(
        &self,
        steps: &[Arc<dyn WorkflowStep>],
        data: &Arc<WorkflowData>,
        execution: &mut WorkflowExecution,
        options: &ExecutionOptions,
    ) {
        info!(
            "dispatching {} steps in parallel (max workers: {})",
            steps.len(),
            options.max_workers
        );

        let semaphore = Arc::new(Semaphore::new(options.max_workers.max(1)));
        let mut tasks: JoinSet<StepResult> = JoinSet::new();
        let mut task_names: HashMap<Id, String> = HashMap::new();

        for step in steps {
            self.fire_before_step(step.as_ref(), data, execution);

            if !step.can_execute(data) {
                info!("skipping step '{}': precondition not met", step.name());
                execution.record(StepResult::skipped(step.name(), "precondition not met"));
                continue;
            }

            let semaphore = Arc::clone(&semaphore);
            let step_task = Arc::clone(step);
            let data_task = Arc::clone(data);
            let handle = tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                execute_attempts(step_task, data_task).await
            });
            task_names.insert(handle.id(), step.name().to_string());
        }

        // Results land in completion order, not submission order; every
        // submitted step runs to completion regardless of siblings.
        while let Some(joined) = tasks.join_next_with_id().await {
            let result = match joined {
                Ok((_, result)) => result,
                Err(join_error) => {
                    let step_name = task_names
                        .get(&join_error.id())
                        .cloned()
                        .unwrap_or_else(|| "<unknown>".to_string());
                    warn!("step '{step_name}' task failed: {join_error}");
                    StepResult::failed(step_name, join_failure(&join_error), Duration::ZERO)
                }
            };

            execution.record(result.clone());
            if let Some(step) = steps.iter().find(|s| s.name() == result.step_name) {
                self.fire_after_step(step.as_ref(), &result, execution);
            }
        }
    }

    async fn run_step(&self, step: &Arc<dyn WorkflowStep>, data: &Arc<WorkflowData>) -> StepResult {
        let started = Instant::now();
        let handle = tokio::spawn(execute_attempts(Arc::clone(step), Arc::clone(data)));
        match handle.await {
            Ok(result) => result,
            Err(join_error) => {
                warn!("step '{}' task failed: {join_error}", step.name());
                StepResult::failed(step.name(), join_failure(&join_error), started.elapsed())
            }
        }
    }

    fn fire_before_step(
        &self,
        step: &dyn WorkflowStep,
        data: &WorkflowData,
        execution: &WorkflowExecution,
    ) {
        for hook in &self.before_step {
            if let Err(hook_error) = hook(step, data, execution) {
                warn!("before_step hook failed: {hook_error}");
            }
        }
    }

    fn fire_after_step(
        &self,
        step: &dyn WorkflowStep,
        result: &StepResult,
        execution: &WorkflowExecution,
    ) {
        for hook in &self.after_step {
            if let Err(hook_error) = hook(step, result, execution) {
                warn!("after_step hook failed: {hook_error}");
            }
        }
    }

    /// Pre-flight check of a compiled step list; does not execute anything.
    ///
    /// An empty list is an error. Duplicate step names, and declared
    /// required inputs that no earlier step produces, are warnings.
    pub fn validate_workflow(&self, steps: &[Arc<dyn WorkflowStep>]) -> ValidationReport {
        let mut report = ValidationReport::default();

        if steps.is_empty() {
            report.push_error("workflow has no steps");
            return report;
        }

        let mut seen = HashSet::new();
        for step in steps {
            if !seen.insert(step.name().to_string()) {
                report.push_warning(format!("duplicate step name: '{}'", step.name()));
            }
        }

        let mut available: HashSet<String> = HashSet::new();
        for (index, step) in steps.iter().enumerate() {
            let missing: Vec<String> = step
                .required_inputs()
                .into_iter()
                .filter(|key| !available.contains(key))
                .collect();
            // The first step legitimately starts from caller input alone.
            if index > 0 && !missing.is_empty() {
                report.push_warning(format!(
                    "step '{}' requires inputs not produced by earlier steps: {}",
                    step.name(),
                    missing.join(", ")
                ));
            }
            available.extend(step.output_keys());
        }

        report
    }

    /// Describes what a run over the given steps would do, without
    /// executing.
    pub fn plan(
        &self,
        steps: &[Arc<dyn WorkflowStep>],
        options: &ExecutionOptions,
    ) -> ExecutionPlan {
        ExecutionPlan {
            total_steps: steps.len(),
            parallel: options.parallel && steps.len() > 1,
            max_workers: options.max_workers,
            steps: steps
                .iter()
                .enumerate()
                .map(|(index, step)| PlannedStep {
                    index,
                    name: step.name().to_string(),
                    description: step.description().to_string(),
                    required_inputs: step.required_inputs(),
                    output_keys: step.output_keys(),
                })
                .collect(),
        }
    }
}

/// Runs one step to a terminal result: per-attempt timeout, retries on
/// failed attempts, wall-clock timing across attempts. Callers spawn this
/// on the runtime so a panicking step surfaces as a `JoinError` instead of
/// unwinding through the engine.
async fn execute_attempts(step: Arc<dyn WorkflowStep>, data: Arc<WorkflowData>) -> StepResult {
    let started = Instant::now();
    let step_name = step.name().to_string();
    let max_retries = step.retry_count();
    let mut attempt = 0u32;

    loop {
        debug!("executing step '{step_name}' (attempt {})", attempt + 1);
        let outcome = match step.timeout() {
            Some(limit) => match timeout(limit, step.execute(&data)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(WorkflowError::Timeout {
                    step_name: step_name.clone(),
                    timeout: limit,
                }),
            },
            None => step.execute(&data).await,
        };

        match outcome {
            Ok(output) => {
                info!(
                    "step '{step_name}' completed in {:.2?}",
                    started.elapsed()
                );
                let mut result = StepResult::completed(&step_name, started.elapsed());
                result.message = output.message;
                result.metadata = output.metadata;
                return result;
            }
            Err(error) => {
                if attempt < max_retries {
                    attempt += 1;
                    info!(
                        "step '{step_name}' failed ({error}), retrying ({attempt}/{max_retries})"
                    );
                    continue;
                }
                warn!("step '{step_name}' failed: {error}");
                return StepResult::failed(&step_name, error.to_string(), started.elapsed());
            }
        }
    }
}

fn join_failure(error: &JoinError) -> String {
    if error.is_panic() {
        "step panicked during execution".to_string()
    } else {
        format!("step task failed: {error}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{FunctionStep, StepOutput};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn noop(name: &str) -> Arc<dyn WorkflowStep> {
        Arc::new(FunctionStep::from_fn(name, |_data, _params| {
            Ok(Value::Null)
        }))
    }

    #[derive(Debug)]
    struct DeclaredStep {
        name: String,
        inputs: Vec<String>,
        outputs: Vec<String>,
    }

    #[async_trait]
    impl WorkflowStep for DeclaredStep {
        fn name(&self) -> &str {
            &self.name
        }

        async fn execute(&self, _data: &WorkflowData) -> Result<StepOutput, WorkflowError> {
            Ok(StepOutput::done())
        }

        fn required_inputs(&self) -> Vec<String> {
            self.inputs.clone()
        }

        fn output_keys(&self) -> Vec<String> {
            self.outputs.clone()
        }
    }

    #[test]
    fn test_validate_empty_workflow() {
        let engine = WorkflowEngine::new();
        let report = engine.validate_workflow(&[]);

        assert!(!report.is_valid());
        assert_eq!(report.errors, vec!["workflow has no steps".to_string()]);
    }

    #[test]
    fn test_validate_duplicate_names() {
        let engine = WorkflowEngine::new();
        let report = engine.validate_workflow(&[noop("a"), noop("a")]);

        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("duplicate"));
    }

    #[test]
    fn test_validate_missing_inputs() {
        let engine = WorkflowEngine::new();
        let steps: Vec<Arc<dyn WorkflowStep>> = vec![
            Arc::new(DeclaredStep {
                name: "producer".to_string(),
                inputs: vec![],
                outputs: vec!["article".to_string()],
            }),
            Arc::new(DeclaredStep {
                name: "consumer".to_string(),
                inputs: vec!["article".to_string(), "image".to_string()],
                outputs: vec![],
            }),
        ];

        let report = engine.validate_workflow(&steps);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("image"));
        assert!(!report.warnings[0].contains("article,"));
    }

    #[test]
    fn test_plan_describes_steps() {
        let engine = WorkflowEngine::new();
        let steps = vec![noop("a"), noop("b")];
        let plan = engine.plan(&steps, &ExecutionOptions::default());

        assert_eq!(plan.total_steps, 2);
        assert!(!plan.parallel);
        assert_eq!(plan.steps[0].name, "a");
        assert_eq!(plan.steps[1].index, 1);
    }

    #[test]
    fn test_options_from_settings() {
        let settings = WorkflowSettings {
            parallel_execution: true,
            stop_on_error: false,
            max_workers: 8,
            timeout: None,
        };
        let options = ExecutionOptions::from(&settings);

        assert!(options.parallel);
        assert!(!options.stop_on_error);
        assert_eq!(options.max_workers, 8);
    }

    #[tokio::test]
    async fn test_execute_empty_step_list_completes() {
        let engine = WorkflowEngine::new();
        let execution = engine.execute(&[], WorkflowData::new(), "empty_run").await;

        assert!(execution.is_success());
        assert!(execution.step_results.is_empty());
    }

    #[tokio::test]
    async fn test_hook_failure_does_not_abort_run() {
        let mut engine = WorkflowEngine::new();
        engine.on_before_step(|step, _data, _execution| {
            Err(WorkflowError::StepFailed {
                step_name: step.name().to_string(),
                details: "hook blew up".to_string(),
            })
        });
        engine.on_complete(|_execution| {
            Err(WorkflowError::Configuration("hook blew up".to_string()))
        });

        let steps = vec![Arc::new(FunctionStep::from_fn("write", |data, _params| {
            data.set("done", json!(true));
            Ok(Value::Null)
        })) as Arc<dyn WorkflowStep>];

        let execution = engine.execute(&steps, WorkflowData::new(), "hooked").await;
        assert!(execution.is_success());
        assert_eq!(execution.data.get("done"), Some(json!(true)));
    }
}
