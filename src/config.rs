use crate::error::WorkflowError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;

fn default_true() -> bool {
    true
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_max_workers() -> usize {
    4
}

/// Declarative description of one step in a workflow.
///
/// The `step_type` tag is resolved through the
/// [`StepRegistry`](crate::StepRegistry) when the configuration is compiled;
/// `config` carries the type-specific parameters handed to the constructor.
/// `dependencies` list step names that must appear earlier in the same
/// workflow; they are validation input, not an enforced schedule: ordering
/// is what actually sequences steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepConfig {
    /// Step name, unique within its workflow.
    pub name: String,
    /// Type tag resolved through the step registry.
    #[serde(rename = "type")]
    pub step_type: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// For `"function"` steps, the registered callable to invoke.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Type-specific parameters passed to the step constructor.
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Names of steps this one expects to run after.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Disabled steps are skipped at compile time.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Per-attempt timeout in seconds; `None` means no timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Number of times a failed attempt is retried.
    #[serde(default)]
    pub retry_count: u32,
}

impl StepConfig {
    /// Creates a step configuration with the given name and type tag.
    pub fn new(name: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            step_type: step_type.into(),
            description: String::new(),
            function: None,
            config: Map::new(),
            dependencies: Vec::new(),
            enabled: true,
            timeout: None,
            retry_count: 0,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Names the registered callable a `"function"` step invokes.
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    /// Replaces the type-specific parameter map.
    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// Sets a single type-specific parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Declares a dependency on an earlier step.
    pub fn depends_on(mut self, step_name: impl Into<String>) -> Self {
        self.dependencies.push(step_name.into());
        self
    }

    /// Replaces the dependency list.
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Marks the step as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Sets the per-attempt timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = Some(timeout_secs);
        self
    }

    /// Sets how many times a failed attempt is retried.
    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Returns the configured timeout as a [`Duration`].
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

/// Workflow-level execution settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Dispatch all steps concurrently instead of in configuration order.
    ///
    /// Only safe for steps without data dependencies: the data bag is shared
    /// across the batch and concurrent writes to overlapping keys are
    /// last-writer-wins.
    pub parallel_execution: bool,
    /// In sequential mode, halt the run at the first failed step.
    pub stop_on_error: bool,
    /// Upper bound on concurrently executing steps in parallel mode.
    pub max_workers: usize,
    /// Advisory whole-workflow timeout in seconds; not enforced by the
    /// engine, carried for the surrounding application.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            parallel_execution: false,
            stop_on_error: true,
            max_workers: default_max_workers(),
            timeout: None,
        }
    }
}

/// A named, versioned, ordered sequence of step configurations.
///
/// Constructed programmatically (see [`WorkflowConfig::builder`]) or
/// deserialized from a persisted file; the engine never mutates a
/// configuration; only the runtime step instances and the data bag change
/// during a run.
///
/// Round-trip invariant: `WorkflowConfig::from_json(config.to_json()?)?`
/// equals the original for all fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    /// Workflow name; must be non-empty.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Configuration format version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Ordered step configurations.
    #[serde(default)]
    pub steps: Vec<StepConfig>,
    /// Execution settings.
    #[serde(default)]
    pub settings: WorkflowSettings,
    /// Initial entries seeded into the data bag before caller input.
    #[serde(default)]
    pub variables: Map<String, Value>,
    /// Free-form workflow-wide configuration for step implementations.
    #[serde(default)]
    pub global_config: Map<String, Value>,
    /// Free-form descriptive metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl WorkflowConfig {
    /// Creates an empty workflow configuration with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version: default_version(),
            steps: Vec::new(),
            settings: WorkflowSettings::default(),
            variables: Map::new(),
            global_config: Map::new(),
            metadata: Map::new(),
        }
    }

    /// Starts a fluent builder for a workflow configuration.
    pub fn builder(name: impl Into<String>) -> WorkflowConfigBuilder {
        WorkflowConfigBuilder {
            config: Self::new(name),
        }
    }

    /// Appends a step configuration.
    pub fn add_step(&mut self, step: StepConfig) {
        self.steps.push(step);
    }

    /// Returns the step configuration with the given name.
    pub fn get_step(&self, name: &str) -> Option<&StepConfig> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Removes the step configuration with the given name.
    ///
    /// Returns `true` if a step was removed.
    pub fn remove_step(&mut self, name: &str) -> bool {
        let before = self.steps.len();
        self.steps.retain(|s| s.name != name);
        self.steps.len() < before
    }

    /// Iterates over the enabled step configurations.
    pub fn enabled_steps(&self) -> impl Iterator<Item = &StepConfig> {
        self.steps.iter().filter(|s| s.enabled)
    }

    /// Returns a copy of this configuration under a new name.
    pub fn clone_as(&self, new_name: impl Into<String>) -> Self {
        let mut cloned = self.clone();
        cloned.name = new_name.into();
        cloned
    }

    /// Validates the configuration.
    ///
    /// Errors block execution: an empty workflow name, an empty step list,
    /// or a step with an empty name. Warnings do not: duplicate step names,
    /// dependencies on unknown, later-declared, or disabled steps.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.name.trim().is_empty() {
            report.push_error("workflow name must not be empty");
        }
        if self.steps.is_empty() {
            report.push_error("workflow has no steps");
        }

        let mut seen = std::collections::HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                report.push_error(format!("step #{index} has an empty name"));
            } else if !seen.insert(step.name.as_str()) {
                report.push_warning(format!("duplicate step name: '{}'", step.name));
            }
        }

        let positions: HashMap<&str, usize> = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| (step.name.as_str(), index))
            .collect();
        for (index, step) in self.steps.iter().enumerate() {
            for dependency in &step.dependencies {
                match positions.get(dependency.as_str()) {
                    None => report.push_warning(format!(
                        "step '{}' depends on unknown step '{dependency}'",
                        step.name
                    )),
                    Some(&position) if position >= index => report.push_warning(format!(
                        "step '{}' depends on '{dependency}' which is declared later",
                        step.name
                    )),
                    Some(&position) => {
                        if !self.steps[position].enabled {
                            report.push_warning(format!(
                                "step '{}' depends on disabled step '{dependency}'",
                                step.name
                            ));
                        }
                    }
                }
            }
        }

        report
    }

    /// Serializes the configuration to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, WorkflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserializes a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, WorkflowError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Fluent builder for [`WorkflowConfig`].
///
/// # Examples
///
/// ```
/// use stepflow::{StepConfig, WorkflowConfig};
/// use serde_json::json;
///
/// let config = WorkflowConfig::builder("demo")
///     .description("two echo steps")
///     .step(StepConfig::new("a", "echo").with_param("msg", json!("hi")))
///     .step(
///         StepConfig::new("b", "echo")
///             .with_param("msg", json!("bye"))
///             .depends_on("a"),
///     )
///     .build()
///     .unwrap();
///
/// assert_eq!(config.steps.len(), 2);
/// ```
#[derive(Debug)]
pub struct WorkflowConfigBuilder {
    config: WorkflowConfig,
}

impl WorkflowConfigBuilder {
    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config.description = description.into();
        self
    }

    /// Sets the configuration version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    /// Appends a step configuration.
    pub fn step(mut self, step: StepConfig) -> Self {
        self.config.steps.push(step);
        self
    }

    /// Seeds an initial data-bag entry.
    pub fn variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.variables.insert(key.into(), value);
        self
    }

    /// Sets a workflow-wide configuration entry.
    pub fn global(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.global_config.insert(key.into(), value);
        self
    }

    /// Sets a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.metadata.insert(key.into(), value);
        self
    }

    /// Enables parallel execution with the given worker bound.
    pub fn parallel(mut self, max_workers: usize) -> Self {
        self.config.settings.parallel_execution = true;
        self.config.settings.max_workers = max_workers;
        self
    }

    /// Sets whether sequential execution halts at the first failure.
    pub fn stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.config.settings.stop_on_error = stop_on_error;
        self
    }

    /// Sets the advisory whole-workflow timeout in seconds.
    pub fn timeout(mut self, timeout_secs: u64) -> Self {
        self.config.settings.timeout = Some(timeout_secs);
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Configuration`] when validation reports
    /// errors (warnings do not block).
    pub fn build(self) -> Result<WorkflowConfig, WorkflowError> {
        let report = self.config.validate();
        if !report.is_valid() {
            return Err(WorkflowError::Configuration(report.errors.join("; ")));
        }
        Ok(self.config)
    }
}

/// Outcome of a non-executing validation pass.
///
/// Errors block execution; warnings are advisory and never do.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ValidationReport {
    /// Findings that make the subject unusable.
    pub errors: Vec<String>,
    /// Advisory findings.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Returns `true` when no errors were found.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Absorbs another report's findings.
    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub(crate) fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub(crate) fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}
