//! Function descriptors and the name → function table.
//!
//! Conventions:
//! - Formula-facing names are stored ALL CAPS; lookups are case-insensitive.
//! - Re-registering a name replaces the previous descriptor.

use crate::engine::RandomSource;
use crate::error::{FormulaError, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maximum nesting of function calls within a single evaluation.
pub const MAX_CALL_DEPTH: usize = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionCategory {
    Math,
    Array,
    Logical,
    Text,
    Date,
    Statistical,
    Custom,
}

/// Semantic type of a parameter or return value (documentation only).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Any,
    Number,
    String,
    Boolean,
    Array,
    Date,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionParameter {
    pub name: String,
    pub kind: ParamType,
    pub optional: bool,
    pub default: Option<Value>,
}

pub type FunctionImpl = Arc<dyn Fn(&[Value], &CallContext<'_>) -> Result<Value> + Send + Sync>;

/// A callable formula function and its metadata.
#[derive(Clone)]
pub struct FormulaFunction {
    pub name: String,
    pub category: FunctionCategory,
    pub description: String,
    pub parameters: Vec<FunctionParameter>,
    pub returns: ParamType,
    pub implementation: FunctionImpl,
}

impl FormulaFunction {
    pub fn new<F>(
        name: impl Into<String>,
        category: FunctionCategory,
        description: impl Into<String>,
        implementation: F,
    ) -> Self
    where
        F: Fn(&[Value], &CallContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        FormulaFunction {
            name: name.into().to_ascii_uppercase(),
            category,
            description: description.into(),
            parameters: Vec::new(),
            returns: ParamType::Any,
            implementation: Arc::new(implementation),
        }
    }

    pub fn param(mut self, name: &str, kind: ParamType) -> Self {
        self.parameters.push(FunctionParameter {
            name: name.to_string(),
            kind,
            optional: false,
            default: None,
        });
        self
    }

    pub fn optional_param(mut self, name: &str, kind: ParamType, default: Option<Value>) -> Self {
        self.parameters.push(FunctionParameter {
            name: name.to_string(),
            kind,
            optional: true,
            default,
        });
        self
    }

    pub fn returns(mut self, kind: ParamType) -> Self {
        self.returns = kind;
        self
    }

    pub fn invoke(&self, args: &[Value], ctx: &CallContext<'_>) -> Result<Value> {
        (self.implementation)(args, ctx)
    }
}

impl fmt::Debug for FormulaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormulaFunction")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("parameters", &self.parameters)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

/// Name → function table consulted during evaluation.
#[derive(Clone, Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, FormulaFunction>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with every built-in function.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtins::register_builtins(&mut registry);
        registry
    }

    pub fn register(&mut self, function: FormulaFunction) {
        self.functions.insert(function.name.clone(), function);
    }

    pub fn unregister(&mut self, name: &str) -> Option<FormulaFunction> {
        self.functions.remove(&name.to_ascii_uppercase())
    }

    pub fn get(&self, name: &str) -> Option<&FormulaFunction> {
        self.functions.get(&name.to_ascii_uppercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All functions, sorted by name.
    pub fn functions(&self) -> Vec<&FormulaFunction> {
        let mut all: Vec<_> = self.functions.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn by_category(&self, category: FunctionCategory) -> Vec<&FormulaFunction> {
        self.functions()
            .into_iter()
            .filter(|f| f.category == category)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// What a function implementation can see of the evaluation it runs in.
#[derive(Clone, Copy)]
pub struct CallContext<'a> {
    pub registry: &'a FunctionRegistry,
    /// Injected "now" in milliseconds since the Unix epoch.
    pub current_time: Option<f64>,
    pub(crate) random: &'a RandomSource,
    pub(crate) depth: usize,
}

impl<'a> CallContext<'a> {
    pub fn new(
        registry: &'a FunctionRegistry,
        current_time: Option<f64>,
        random: &'a RandomSource,
    ) -> Self {
        CallContext {
            registry,
            current_time,
            random,
            depth: 0,
        }
    }

    /// Current time in milliseconds: the injected time if any, else the wall clock.
    pub fn now(&self) -> f64 {
        self.current_time
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis() as f64)
    }

    /// Next draw in `[0, 1)`.
    pub fn random(&self) -> f64 {
        self.random.next()
    }

    /// Look up `name` and invoke it with `args` one call level deeper.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(FormulaError::CallDepthExceeded(MAX_CALL_DEPTH));
        }
        let function = self
            .registry
            .get(name)
            .ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;
        let nested = CallContext {
            depth: self.depth + 1,
            ..*self
        };
        function.invoke(args, &nested).map_err(|err| match err {
            FormulaError::Runtime(message) => FormulaError::Function {
                name: function.name.clone(),
                message,
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer() -> FormulaFunction {
        FormulaFunction::new("answer", FunctionCategory::Math, "The answer", |_, _| {
            Ok(Value::from(42))
        })
    }

    #[test]
    fn test_names_are_uppercased_and_lookup_is_case_insensitive() {
        let mut registry = FunctionRegistry::new();
        registry.register(answer());
        assert!(registry.contains("ANSWER"));
        assert!(registry.contains("Answer"));
        assert_eq!(registry.get("answer").unwrap().name, "ANSWER");
    }

    #[test]
    fn test_reregistering_overwrites() {
        let mut registry = FunctionRegistry::new();
        registry.register(answer());
        registry.register(FormulaFunction::new(
            "ANSWER",
            FunctionCategory::Custom,
            "",
            |_, _| Ok(Value::from(7)),
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("ANSWER").unwrap().category, FunctionCategory::Custom);
    }

    #[test]
    fn test_call_wraps_runtime_errors_with_function_name() {
        let mut registry = FunctionRegistry::new();
        registry.register(FormulaFunction::new(
            "FAIL",
            FunctionCategory::Math,
            "",
            |_, _| Err(FormulaError::runtime("boom")),
        ));
        let random = RandomSource::new(None);
        let ctx = CallContext::new(&registry, None, &random);
        let err = ctx.call("fail", &[]).unwrap_err();
        assert_eq!(err.to_string(), "Error in function FAIL: boom");
    }

    #[test]
    fn test_call_unknown_function() {
        let registry = FunctionRegistry::new();
        let random = RandomSource::new(None);
        let ctx = CallContext::new(&registry, None, &random);
        assert_eq!(
            ctx.call("NOPE", &[]).unwrap_err(),
            FormulaError::UnknownFunction("NOPE".to_string())
        );
    }

    #[test]
    fn test_now_prefers_injected_time() {
        let registry = FunctionRegistry::new();
        let random = RandomSource::new(None);
        let ctx = CallContext::new(&registry, Some(1_000.0), &random);
        assert_eq!(ctx.now(), 1_000.0);
    }
}
