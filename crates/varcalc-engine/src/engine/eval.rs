//! The formula evaluator.
//!
//! `evaluate` rewrites the formula text in stages: variable references are
//! replaced by literals, then function calls are resolved innermost-first and
//! replaced by their results, and the remaining function-free text is reduced
//! by the expression interpreter. Results are cached by the substituted text,
//! so a dependency change always produces a different cache key.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::context::{ContextUpdate, EvaluationContext, RandomSource};
use super::interp::{self, Scope};
use super::parser::parse_expression;
use super::scan::{find_innermost_call, literal_for_splice, split_arguments, substitute_variables};
use crate::error::{FormulaError, Result};
use crate::registry::{CallContext, FormulaFunction, FunctionCategory, FunctionRegistry};
use crate::value::Value;

/// Supplies variable values during substitution.
pub trait VariableSource {
    /// The value of `name`, or `None` if it is not a known variable.
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl VariableSource for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Kind of an evaluation result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
    Error,
}

impl ResultType {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => ResultType::Null,
            Value::Bool(_) => ResultType::Boolean,
            Value::Number(_) => ResultType::Number,
            Value::String(_) => ResultType::String,
            Value::Array(_) => ResultType::Array,
            Value::Object(_) => ResultType::Object,
        }
    }
}

/// Outcome of evaluating one formula. Failures are carried in `error`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub value: Value,
    #[serde(rename = "type")]
    pub value_type: ResultType,
    /// Variable names substituted into the formula.
    pub dependencies: Vec<String>,
    pub error: Option<String>,
    pub execution_time: Duration,
}

impl EvaluationResult {
    fn success(value: Value, dependencies: Vec<String>, execution_time: Duration) -> Self {
        EvaluationResult {
            value_type: ResultType::of(&value),
            value,
            dependencies,
            error: None,
            execution_time,
        }
    }

    fn failure(error: String, dependencies: Vec<String>, execution_time: Duration) -> Self {
        EvaluationResult {
            value: Value::Null,
            value_type: ResultType::Error,
            dependencies,
            error: Some(error),
            execution_time,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Evaluates formula strings against a context and a function registry.
#[derive(Debug)]
pub struct FormulaEvaluator {
    registry: FunctionRegistry,
    context: EvaluationContext,
    random: RandomSource,
    cache: DashMap<String, EvaluationResult>,
}

impl FormulaEvaluator {
    /// Evaluator with all built-ins and an empty context.
    pub fn new() -> Self {
        Self::with_context(EvaluationContext::default())
    }

    pub fn with_context(context: EvaluationContext) -> Self {
        Self::with_registry(FunctionRegistry::with_builtins(), context)
    }

    pub fn with_registry(registry: FunctionRegistry, context: EvaluationContext) -> Self {
        FormulaEvaluator {
            registry,
            random: RandomSource::new(context.random_seed),
            context,
            cache: DashMap::new(),
        }
    }

    /// The current context; `random_seed` reflects draws made so far.
    pub fn context(&self) -> EvaluationContext {
        EvaluationContext {
            random_seed: self.random.seed(),
            ..self.context.clone()
        }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Merge `update` into the context and drop every cached result.
    pub fn update_context(&mut self, update: ContextUpdate) {
        if let Some(variables) = update.variables {
            self.context.variables.extend(variables);
        }
        if let Some(current_time) = update.current_time {
            self.context.current_time = current_time;
        }
        if let Some(seed) = update.random_seed {
            self.context.random_seed = seed;
            self.random.reseed(seed);
        }
        self.clear_cache();
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn register_function(&mut self, function: FormulaFunction) {
        self.registry.register(function);
        self.clear_cache();
    }

    pub fn unregister_function(&mut self, name: &str) -> Option<FormulaFunction> {
        let removed = self.registry.unregister(name);
        self.clear_cache();
        removed
    }

    pub fn functions(&self) -> Vec<&FormulaFunction> {
        self.registry.functions()
    }

    pub fn functions_by_category(&self, category: FunctionCategory) -> Vec<&FormulaFunction> {
        self.registry.by_category(category)
    }

    /// Evaluate `formula` against the context's variable map.
    pub fn evaluate(&self, formula: &str) -> EvaluationResult {
        self.evaluate_with(formula, &self.context.variables)
    }

    /// Evaluate `formula`, resolving variable references through `source`.
    pub fn evaluate_with(&self, formula: &str, source: &dyn VariableSource) -> EvaluationResult {
        let started = Instant::now();
        let trimmed = formula.trim();
        let body = trimmed.strip_prefix('=').unwrap_or(trimmed).trim();

        let (substituted, dependencies) = substitute_variables(body, |name| source.lookup(name));

        if let Some(hit) = self.cache.get(&substituted) {
            trace!(formula = %substituted, "formula cache hit");
            let mut result = hit.clone();
            result.dependencies = dependencies;
            return result;
        }

        let result = match self.reduce(&substituted) {
            Ok(value) => EvaluationResult::success(value, dependencies, started.elapsed()),
            Err(err) => {
                debug!(formula = %body, error = %err, "formula evaluation failed");
                EvaluationResult::failure(err.to_string(), dependencies, started.elapsed())
            }
        };
        self.cache.insert(substituted, result.clone());
        result
    }

    fn call_context(&self) -> CallContext<'_> {
        CallContext::new(&self.registry, self.context.current_time, &self.random)
    }

    fn reduce(&self, text: &str) -> Result<Value> {
        let ctx = self.call_context();
        let mut text = text.to_string();
        while let Some(site) = find_innermost_call(&text)? {
            let args = parse_arguments(&text[site.open + 1..site.close], &ctx);
            let value = ctx.call(&site.name, &args)?;
            text.replace_range(site.start..=site.close, &literal_for_splice(&value));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        parse_expression(&text)
            .and_then(|expr| interp::evaluate(&expr, &Scope::new(), &ctx))
            .map_err(|cause| FormulaError::Expression {
                expression: text.clone(),
                cause: Box::new(cause),
            })
    }
}

impl Default for FormulaEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn raw argument text into values: data literals are taken as-is, other
/// expressions are reduced, and anything that fails is kept as a string.
fn parse_arguments(text: &str, ctx: &CallContext<'_>) -> Vec<Value> {
    split_arguments(text)
        .into_iter()
        .map(|segment| match parse_expression(segment) {
            Ok(expr) => expr.as_literal().unwrap_or_else(|| {
                interp::evaluate(&expr, &Scope::new(), ctx)
                    .unwrap_or_else(|_| Value::String(segment.to_string()))
            }),
            Err(_) => Value::String(segment.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores() -> EvaluationContext {
        EvaluationContext::new()
            .with_variable("score", 85)
            .with_variable("scores", vec![10, 20, 30, 40, 50])
    }

    #[test]
    fn test_nested_if_grades() {
        let evaluator = FormulaEvaluator::with_context(scores());
        let result = evaluator.evaluate(r#"=IF(score >= 90, "A", IF(score >= 80, "B", "C"))"#);
        assert_eq!(result.value, Value::from("B"));
        assert_eq!(result.value_type, ResultType::String);
        assert_eq!(result.dependencies, vec!["score".to_string()]);
    }

    #[test]
    fn test_aggregates_over_array_variable() {
        let evaluator = FormulaEvaluator::with_context(scores());
        assert_eq!(evaluator.evaluate("SUM(scores)").value, Value::from(150));
        assert_eq!(evaluator.evaluate("AVERAGE(scores)").value, Value::from(30));
        assert_eq!(
            evaluator.evaluate("SUM(scores) / COUNT(scores)").value,
            Value::from(30)
        );
    }

    #[test]
    fn test_unknown_function_is_reported_not_raised() {
        let evaluator = FormulaEvaluator::new();
        let result = evaluator.evaluate("1 + FROB(2)");
        assert_eq!(result.value, Value::Null);
        assert_eq!(result.value_type, ResultType::Error);
        assert!(result.error.unwrap().contains("Unknown function: FROB"));
    }

    #[test]
    fn test_undefined_identifier_fails_final_reduction() {
        let evaluator = FormulaEvaluator::new();
        let result = evaluator.evaluate("missing + 1");
        let error = result.error.unwrap();
        assert!(error.starts_with("Failed to evaluate expression \"missing + 1\""));
        assert!(error.contains("Undefined identifier: missing"));
    }

    #[test]
    fn test_malformed_formula_is_reported() {
        let evaluator = FormulaEvaluator::new();
        assert!(evaluator.evaluate("1 +").error.is_some());
        assert!(evaluator.evaluate("SUM(1, 2").error.is_some());
    }

    #[test]
    fn test_function_results_spliced_as_literals() {
        let evaluator = FormulaEvaluator::new();
        assert_eq!(
            evaluator.evaluate(r#"CONCAT(UPPER("a(b"), ", ", LOWER("C)"))"#).value,
            Value::from("A(B, c)")
        );
        assert_eq!(evaluator.evaluate("10 - ABS(-3) * -1").value, Value::from(13));
    }

    #[test]
    fn test_unresolvable_argument_is_opaque_string() {
        let evaluator = FormulaEvaluator::new();
        assert_eq!(evaluator.evaluate("UPPER(hello)").value, Value::from("HELLO"));
    }

    #[test]
    fn test_empty_formula_is_null() {
        let evaluator = FormulaEvaluator::new();
        let result = evaluator.evaluate("  = ");
        assert!(result.is_ok());
        assert_eq!(result.value_type, ResultType::Null);
    }

    #[test]
    fn test_cache_is_keyed_by_substituted_text() {
        let mut evaluator =
            FormulaEvaluator::with_context(EvaluationContext::new().with_variable("x", 1));
        assert_eq!(evaluator.evaluate("x + 1").value, Value::from(2));
        let mut variables = HashMap::new();
        variables.insert("x".to_string(), Value::from(5));
        evaluator.update_context(ContextUpdate {
            variables: Some(variables),
            ..Default::default()
        });
        assert_eq!(evaluator.evaluate("x + 1").value, Value::from(6));

        let mut source = HashMap::new();
        source.insert("x".to_string(), Value::from(100));
        assert_eq!(evaluator.evaluate_with("x + 1", &source).value, Value::from(101));
    }

    #[test]
    fn test_seeded_random_is_replayable() {
        let context = EvaluationContext::new().with_random_seed(12345);
        let a = FormulaEvaluator::with_context(context.clone());
        let b = FormulaEvaluator::with_context(context);
        let first = a.evaluate("RANDOM()").value;
        assert_eq!(first, b.evaluate("RANDOM()").value);
        let expected = ((12345u64 * 9301 + 49297) % 233280) as f64 / 233280.0;
        assert_eq!(first, Value::from(expected));
    }

    #[test]
    fn test_update_context_clears_cache() {
        let mut evaluator =
            FormulaEvaluator::with_context(EvaluationContext::new().with_current_time(1_000.0));
        assert_eq!(evaluator.evaluate("NOW()").value, Value::from(1_000));
        evaluator.update_context(ContextUpdate {
            current_time: Some(Some(2_000.0)),
            ..Default::default()
        });
        assert_eq!(evaluator.evaluate("NOW()").value, Value::from(2_000));
        assert_eq!(evaluator.evaluate("TIME_SINCE(500)").value, Value::from(1_500));
    }

    #[test]
    fn test_registered_function_is_callable() {
        let mut evaluator = FormulaEvaluator::new();
        evaluator.register_function(
            FormulaFunction::new("double", FunctionCategory::Custom, "x * 2", |args, _| {
                Ok(Value::from(args.first().map(Value::to_number).unwrap_or(0.0) * 2.0))
            }),
        );
        assert_eq!(evaluator.evaluate("Double(21)").value, Value::from(42));
        assert_eq!(evaluator.functions_by_category(FunctionCategory::Custom).len(), 1);
        evaluator.unregister_function("DOUBLE");
        assert!(evaluator.evaluate("DOUBLE(21)").error.is_some());
    }

    #[test]
    fn test_function_error_surfaces_in_result() {
        let evaluator = FormulaEvaluator::new();
        let result = evaluator.evaluate("SORT(5)");
        assert!(result.error.unwrap().contains("Error in function SORT"));
    }
}
