use crate::config::StepConfig;
use crate::data::WorkflowData;
use crate::error::WorkflowError;
use crate::step::{StepFunction, WorkflowStep};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Constructor closure that builds a runtime step from its configuration.
pub type StepConstructor =
    dyn Fn(&StepConfig) -> Result<Arc<dyn WorkflowStep>, WorkflowError> + Send + Sync;

/// Maps string type tags to step constructors.
///
/// The registry decouples the engine, which only knows "run this list of
/// steps", from the concrete step implementations supplied by the
/// surrounding application. A configuration naming an unregistered tag is a
/// hard error at compile time, never a silent skip.
///
/// # Examples
///
/// ```
/// use stepflow::{FunctionStep, StepConfig, StepRegistry, WorkflowStep};
/// use serde_json::{json, Value};
/// use std::sync::Arc;
///
/// let mut registry = StepRegistry::new();
/// registry.register("echo", |config: &StepConfig| {
///     let name = config.name.clone();
///     let message = config.config.get("msg").cloned().unwrap_or(Value::Null);
///     Ok(Arc::new(FunctionStep::from_fn(name.clone(), move |data, _params| {
///         data.set(name.clone(), message.clone());
///         Ok(Value::Null)
///     })) as Arc<dyn WorkflowStep>)
/// });
///
/// assert!(registry.contains("echo"));
/// let step = registry
///     .create(&StepConfig::new("a", "echo").with_param("msg", json!("hi")))
///     .unwrap();
/// assert_eq!(step.name(), "a");
/// ```
#[derive(Default)]
pub struct StepRegistry {
    constructors: HashMap<String, Arc<StepConstructor>>,
}

impl StepRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates a type tag with a step constructor.
    ///
    /// Registering the same tag again replaces the previous constructor.
    pub fn register<F>(&mut self, type_tag: impl Into<String>, constructor: F)
    where
        F: Fn(&StepConfig) -> Result<Arc<dyn WorkflowStep>, WorkflowError> + Send + Sync + 'static,
    {
        self.constructors
            .insert(type_tag.into(), Arc::new(constructor));
    }

    /// Instantiates the step described by the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::UnknownStepType`] if no constructor is
    /// registered for the configuration's type tag, or whatever error the
    /// constructor itself reports.
    pub fn create(&self, config: &StepConfig) -> Result<Arc<dyn WorkflowStep>, WorkflowError> {
        let constructor = self
            .constructors
            .get(&config.step_type)
            .ok_or_else(|| WorkflowError::UnknownStepType(config.step_type.clone()))?;
        constructor(config)
    }

    /// Returns `true` if a constructor is registered for the tag.
    pub fn contains(&self, type_tag: &str) -> bool {
        self.constructors.contains_key(type_tag)
    }

    /// Returns all registered type tags, sorted.
    pub fn available_types(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.constructors.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Returns the number of registered type tags.
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Returns `true` if no type tags are registered.
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("types", &self.available_types())
            .finish()
    }
}

/// Maps names to the callables function steps invoke.
///
/// Distinct from the step-type registry: step types describe *kinds* of
/// steps, while this table holds the individual callables that `"function"`
/// steps resolve by name at compile time. Names are opaque keys; dotted
/// names like `"poem.generate_article"` are ordinary entries.
///
/// The table sits behind an interior lock so the pre-registered `"function"`
/// step-type constructor can hold a shared handle while registration
/// continues.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, Arc<StepFunction>>>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callable under the given name.
    ///
    /// Registering the same name again replaces the previous callable.
    pub fn register<F>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(&WorkflowData, &Map<String, Value>) -> Result<Value, WorkflowError>
            + Send
            + Sync
            + 'static,
    {
        self.functions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), Arc::new(function));
    }

    /// Resolves a callable by name.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::UnknownFunction`] if nothing is registered
    /// under the name.
    pub fn resolve(&self, name: &str) -> Result<Arc<StepFunction>, WorkflowError> {
        self.functions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownFunction(name.to_string()))
    }

    /// Returns `true` if a callable is registered under the name.
    pub fn contains(&self, name: &str) -> bool {
        self.functions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    /// Returns all registered function names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Returns the number of registered callables.
    pub fn len(&self) -> usize {
        self.functions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Returns `true` if no callables are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::FunctionStep;
    use serde_json::json;

    fn noop_constructor(config: &StepConfig) -> Result<Arc<dyn WorkflowStep>, WorkflowError> {
        Ok(Arc::new(FunctionStep::from_fn(
            config.name.clone(),
            |_data, _params| Ok(Value::Null),
        )))
    }

    #[test]
    fn test_register_and_create() {
        let mut registry = StepRegistry::new();
        registry.register("noop", noop_constructor);

        assert!(registry.contains("noop"));
        assert_eq!(registry.len(), 1);

        let step = registry
            .create(&StepConfig::new("a", "noop"))
            .expect("registered type");
        assert_eq!(step.name(), "a");
    }

    #[test]
    fn test_unknown_type_is_hard_error() {
        let registry = StepRegistry::new();
        let result = registry.create(&StepConfig::new("a", "missing"));

        assert!(matches!(
            result,
            Err(WorkflowError::UnknownStepType(tag)) if tag == "missing"
        ));
    }

    #[test]
    fn test_available_types_sorted() {
        let mut registry = StepRegistry::new();
        registry.register("zeta", noop_constructor);
        registry.register("alpha", noop_constructor);

        assert_eq!(
            registry.available_types(),
            vec!["alpha".to_string(), "zeta".to_string()]
        );
    }

    #[test]
    fn test_reregistering_replaces_constructor() {
        let mut registry = StepRegistry::new();
        registry.register("noop", noop_constructor);
        registry.register("noop", |config: &StepConfig| {
            Ok(Arc::new(FunctionStep::from_fn(
                format!("{}_v2", config.name),
                |_data, _params| Ok(Value::Null),
            )) as Arc<dyn WorkflowStep>)
        });

        assert_eq!(registry.len(), 1);
        let step = registry
            .create(&StepConfig::new("a", "noop"))
            .expect("registered type");
        assert_eq!(step.name(), "a_v2");
    }

    #[test]
    fn test_function_registry_resolve() {
        let registry = FunctionRegistry::new();
        registry.register("double", |data, _params| {
            let n = data.get_or("n", json!(0));
            Ok(json!(n.as_i64().unwrap_or(0) * 2))
        });

        assert!(registry.contains("double"));
        assert_eq!(registry.names(), vec!["double".to_string()]);

        let function = registry.resolve("double").expect("registered function");
        let data = WorkflowData::new();
        data.set("n", json!(21));
        let value = function(&data, &Map::new()).expect("callable succeeds");
        assert_eq!(value, json!(42));
    }

    #[test]
    fn test_function_registry_unknown_name() {
        let registry = FunctionRegistry::new();
        let result = registry.resolve("missing");

        assert!(matches!(
            result,
            Err(WorkflowError::UnknownFunction(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_dotted_names_are_plain_keys() {
        let registry = FunctionRegistry::new();
        registry.register("poem.generate_article", |_data, _params| Ok(Value::Null));

        assert!(registry.contains("poem.generate_article"));
        assert!(registry.resolve("poem.generate_article").is_ok());
    }
}
