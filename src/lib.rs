//! # stepflow
//!
//! A step-based workflow execution engine for Rust.
//!
//! Stepflow runs ordered lists of steps against a shared key-value data bag,
//! records every outcome into an execution history, and keeps the engine
//! decoupled from the step implementations through a string-tag registry,
//! so workflows can be described declaratively, persisted as JSON, and
//! executed against whatever steps the application registers.
//!
//! ## Features
//!
//! - **Declarative configuration**: [`WorkflowConfig`] describes a named,
//!   versioned sequence of steps with dependencies, parameters, and
//!   enablement flags; serializable with `serde` and round-trip stable
//! - **Async first**: steps are `async-trait` implementations executed on
//!   `tokio`, with per-step cooperative timeouts and retries
//! - **Failure as data**: a failing step becomes a failed
//!   [`StepResult`], never a crashed run; [`WorkflowEngine::execute`]
//!   always returns a complete [`WorkflowExecution`] record
//! - **Sequential and parallel modes**: strict configuration order by
//!   default, opt-in bounded-concurrency dispatch for independent steps
//! - **Lifecycle hooks**: before/after-step, on-error, and on-complete
//!   callbacks for logging and side effects, never control flow
//! - **Bounded history**: [`WorkflowManager`] retains a capped log of past
//!   executions and derives aggregate statistics from it
//!
//! ## Quick Start
//!
//! ```rust
//! use stepflow::prelude::*;
//! use serde_json::{json, Map, Value};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), WorkflowError> {
//! let manager = WorkflowManager::new();
//!
//! // Steps invoke callables registered by name.
//! manager.register_function("greet", |data: &WorkflowData, params: &Map<String, Value>| {
//!     let name = params.get("name").and_then(Value::as_str).unwrap_or("world");
//!     data.set("greeting", json!(format!("hello, {name}")));
//!     Ok(Value::Null)
//! });
//!
//! let config = WorkflowConfig::builder("greeting")
//!     .step(
//!         StepConfig::new("greet_step", "function")
//!             .with_function("greet")
//!             .with_param("name", json!("stepflow")),
//!     )
//!     .build()?;
//!
//! let execution = manager.execute_workflow(&config, Map::new(), None).await?;
//! assert!(execution.is_success());
//! assert_eq!(execution.data.get("greeting"), Some(json!("hello, stepflow")));
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Step Types
//!
//! Anything implementing [`WorkflowStep`] can be registered under a type
//! tag and instantiated from configuration:
//!
//! ```rust
//! use stepflow::prelude::*;
//! use async_trait::async_trait;
//! use serde_json::{json, Map};
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct StampStep {
//!     name: String,
//! }
//!
//! #[async_trait]
//! impl WorkflowStep for StampStep {
//!     fn name(&self) -> &str {
//!         &self.name
//!     }
//!
//!     async fn execute(&self, data: &WorkflowData) -> Result<StepOutput, WorkflowError> {
//!         data.set(format!("{}_ran", self.name), json!(true));
//!         Ok(StepOutput::done())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), WorkflowError> {
//! let mut manager = WorkflowManager::new();
//! manager.register_step_type("stamp", |config: &StepConfig| {
//!     Ok(Arc::new(StampStep {
//!         name: config.name.clone(),
//!     }) as Arc<dyn WorkflowStep>)
//! });
//!
//! let config = WorkflowConfig::builder("stamps")
//!     .step(StepConfig::new("first", "stamp"))
//!     .build()?;
//!
//! let execution = manager.execute_workflow(&config, Map::new(), None).await?;
//! assert_eq!(execution.data.get("first_ran"), Some(json!(true)));
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure Handling
//!
//! Configuration errors fail fast, before any step runs. Step failures do
//! not raise: the caller inspects the returned execution.
//!
//! ```rust
//! use stepflow::prelude::*;
//! use serde_json::Map;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), WorkflowError> {
//! let manager = WorkflowManager::new();
//! manager.register_function("flaky", |_data, _params| {
//!     Err(WorkflowError::StepFailed {
//!         step_name: "flaky".to_string(),
//!         details: "upstream unavailable".to_string(),
//!     })
//! });
//!
//! let config = WorkflowConfig::builder("pipeline")
//!     .step(StepConfig::new("fetch", "function").with_function("flaky"))
//!     .build()?;
//!
//! let execution = manager.execute_workflow(&config, Map::new(), None).await?;
//! assert_eq!(execution.status, WorkflowStatus::Failed);
//! assert!(execution.step_result("fetch").and_then(|r| r.error.clone()).is_some());
//! # Ok(())
//! # }
//! ```

mod config;
mod data;
mod engine;
mod error;
mod execution;
mod manager;
mod registry;
mod step;
mod store;

pub mod prelude;

pub use config::{
    StepConfig, ValidationReport, WorkflowConfig, WorkflowConfigBuilder, WorkflowSettings,
};
pub use data::WorkflowData;
pub use engine::{ExecutionOptions, ExecutionPlan, PlannedStep, WorkflowEngine};
pub use error::WorkflowError;
pub use execution::{StepResult, StepStatus, WorkflowExecution, WorkflowStatus};
pub use manager::{ExecutionStats, WorkflowManager, DEFAULT_HISTORY_LIMIT};
pub use registry::{FunctionRegistry, StepConstructor, StepRegistry};
pub use step::{FunctionStep, StepFunction, StepOutput, WorkflowStep};
pub use store::ConfigStore;
