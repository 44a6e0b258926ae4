//! Author-defined formula functions.
//!
//! A definition is a name, an ordered parameter list and a body written in
//! the expression language. Bodies are parsed once at definition time and
//! interpreted on each call with the arguments bound to the parameters, so
//! no host code is ever generated from definition text.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::engine::{
    EvaluationContext, Expr, FormulaEvaluator, RESERVED_WORDS, Scope, evaluate, parse_expression,
};
use crate::error::{FormulaError, Result};
use crate::registry::{FormulaFunction, FunctionCategory, FunctionRegistry, ParamType};

fn function_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[A-Z_][A-Z0-9_]*$").expect("function name regex must compile")
    })
}

fn parameter_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[a-z_][a-z0-9_]*$").expect("parameter name regex must compile")
    })
}

/// Plain-data form of a custom function, as exported and imported.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    pub body: String,
}

impl CustomFunctionDefinition {
    pub fn new(name: impl Into<String>, parameters: &[&str], body: impl Into<String>) -> Self {
        CustomFunctionDefinition {
            name: name.into(),
            description: String::new(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            body: body.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Clone, Debug)]
struct CompiledFunction {
    /// Stored with the name uppercased.
    definition: CustomFunctionDefinition,
    body: Arc<Expr>,
}

impl CompiledFunction {
    fn compile(definition: CustomFunctionDefinition) -> Result<Self> {
        if !function_name_re().is_match(&definition.name) {
            return Err(FormulaError::InvalidFunctionName(definition.name));
        }
        let name = definition.name.to_ascii_uppercase();

        let mut seen = HashSet::new();
        for parameter in &definition.parameters {
            if !parameter_name_re().is_match(parameter)
                || RESERVED_WORDS.contains(&parameter.as_str())
            {
                return Err(FormulaError::InvalidParameterName {
                    function: name,
                    parameter: parameter.clone(),
                });
            }
            if !seen.insert(parameter.as_str()) {
                return Err(FormulaError::DuplicateParameter {
                    function: name,
                    parameter: parameter.clone(),
                });
            }
        }

        let body = parse_expression(strip_statement_syntax(&definition.body))?;
        Ok(CompiledFunction {
            definition: CustomFunctionDefinition { name, ..definition },
            body: Arc::new(body),
        })
    }

    /// Registry descriptor that binds arguments to parameters by position.
    /// Missing arguments are `null`; extra arguments are ignored.
    fn to_formula_function(&self) -> FormulaFunction {
        let parameters = self.definition.parameters.clone();
        let body = Arc::clone(&self.body);
        let mut function = FormulaFunction::new(
            self.definition.name.as_str(),
            FunctionCategory::Custom,
            self.definition.description.as_str(),
            move |args, ctx| {
                let scope: Scope = parameters
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (p.clone(), args.get(i).cloned().unwrap_or_default()))
                    .collect();
                evaluate(&body, &scope, ctx)
            },
        );
        for parameter in &self.definition.parameters {
            function = function.param(parameter, ParamType::Any);
        }
        function
    }
}

/// `return expr;` is accepted as a body and means `expr`.
fn strip_statement_syntax(body: &str) -> &str {
    let body = body.trim();
    let body = match body.strip_prefix("return") {
        Some(rest) if rest.starts_with(|c: char| c.is_whitespace() || c == '(') => rest,
        _ => body,
    };
    body.trim().trim_end_matches(';').trim_end()
}

/// Owns custom function definitions and a registry of built-ins plus every
/// defined function.
#[derive(Clone, Debug)]
pub struct CustomFunctionManager {
    functions: BTreeMap<String, CompiledFunction>,
    registry: FunctionRegistry,
}

impl CustomFunctionManager {
    pub fn new() -> Self {
        CustomFunctionManager {
            functions: BTreeMap::new(),
            registry: FunctionRegistry::with_builtins(),
        }
    }

    /// Validate and compile `definition`, replacing any function of the same
    /// name. Nothing is registered if validation or parsing fails.
    pub fn define_function(&mut self, definition: CustomFunctionDefinition) -> Result<()> {
        let compiled = CompiledFunction::compile(definition)?;
        let name = compiled.definition.name.clone();
        debug!(
            function = %name,
            params = compiled.definition.parameters.len(),
            "defined custom function"
        );
        self.registry.register(compiled.to_formula_function());
        self.functions.insert(name, compiled);
        Ok(())
    }

    /// Descriptor for a defined function, suitable for
    /// [`FormulaEvaluator::register_function`].
    pub fn get_function(&self, name: &str) -> Option<FormulaFunction> {
        self.functions
            .get(&name.to_ascii_uppercase())
            .map(CompiledFunction::to_formula_function)
    }

    pub fn get_all_functions(&self) -> Vec<FormulaFunction> {
        self.functions
            .values()
            .map(CompiledFunction::to_formula_function)
            .collect()
    }

    pub fn definition(&self, name: &str) -> Option<&CustomFunctionDefinition> {
        self.functions
            .get(&name.to_ascii_uppercase())
            .map(|f| &f.definition)
    }

    /// Remove a defined function. A built-in it shadowed becomes visible again.
    pub fn remove_function(&mut self, name: &str) -> bool {
        let key = name.to_ascii_uppercase();
        if self.functions.remove(&key).is_none() {
            return false;
        }
        self.registry.unregister(&key);
        if let Some(builtin) = FunctionRegistry::with_builtins().get(&key) {
            self.registry.register(builtin.clone());
        }
        true
    }

    /// Every definition, sorted by name.
    pub fn export_functions(&self) -> Vec<CustomFunctionDefinition> {
        self.functions
            .values()
            .map(|f| f.definition.clone())
            .collect()
    }

    /// Define each function independently; failures are logged and skipped.
    /// Returns how many were defined.
    pub fn import_functions(
        &mut self,
        definitions: impl IntoIterator<Item = CustomFunctionDefinition>,
    ) -> usize {
        let mut imported = 0;
        for definition in definitions {
            let name = definition.name.clone();
            match self.define_function(definition) {
                Ok(()) => imported += 1,
                Err(err) => {
                    warn!(function = %name, error = %err, "skipping custom function import")
                }
            }
        }
        imported
    }

    /// A fresh evaluator over `context` that knows the built-ins and every
    /// currently defined function.
    pub fn create_sandboxed_evaluator(&self, context: EvaluationContext) -> FormulaEvaluator {
        FormulaEvaluator::with_registry(self.registry.clone(), context)
    }

    /// Register every defined function into an existing evaluator.
    pub fn install_into(&self, evaluator: &mut FormulaEvaluator) {
        for function in self.get_all_functions() {
            evaluator.register_function(function);
        }
    }

    /// Built-ins plus defined functions.
    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for CustomFunctionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn score_scale() -> CustomFunctionDefinition {
        CustomFunctionDefinition::new(
            "score_scale",
            &["rawScore", "min", "max", "newMin", "newMax"],
            "return IF(rawScore < min || rawScore > max, null, \
             (rawScore - min) / (max - min) * (newMax - newMin) + newMin);",
        )
        .with_description("Rescale a score into a new range")
    }

    #[test]
    fn test_define_and_call_through_sandboxed_evaluator() {
        let mut manager = CustomFunctionManager::new();
        manager.define_function(score_scale()).unwrap();
        let evaluator =
            manager.create_sandboxed_evaluator(EvaluationContext::new().with_variable("raw", 75));

        assert_eq!(evaluator.evaluate("SCORE_SCALE(raw, 50, 100, 0, 10)").value, Value::from(5));
        assert_eq!(evaluator.evaluate("SCORE_SCALE(120, 50, 100, 0, 10)").value, Value::Null);
        assert_eq!(
            evaluator.evaluate("ROUND(SCORE_SCALE(60, 50, 100, 0, 1) * 100)").value,
            Value::from(20)
        );
    }

    #[test]
    fn test_descriptor_projection() {
        let mut manager = CustomFunctionManager::new();
        manager.define_function(score_scale()).unwrap();
        let function = manager.get_function("Score_Scale").unwrap();
        assert_eq!(function.name, "SCORE_SCALE");
        assert_eq!(function.category, FunctionCategory::Custom);
        assert_eq!(function.parameters.len(), 5);
        assert!(function.parameters.iter().all(|p| p.kind == ParamType::Any));
        assert_eq!(function.description, "Rescale a score into a new range");
    }

    #[test]
    fn test_invalid_names_are_rejected_without_registration() {
        let mut manager = CustomFunctionManager::new();
        let err = manager
            .define_function(CustomFunctionDefinition::new("2FAST", &[], "1"))
            .unwrap_err();
        assert_eq!(err, FormulaError::InvalidFunctionName("2FAST".to_string()));

        let err = manager
            .define_function(CustomFunctionDefinition::new("OK", &["a-b"], "1"))
            .unwrap_err();
        assert!(matches!(err, FormulaError::InvalidParameterName { .. }));

        let err = manager
            .define_function(CustomFunctionDefinition::new("DUP", &["x", "x"], "x"))
            .unwrap_err();
        assert!(matches!(err, FormulaError::DuplicateParameter { .. }));

        assert!(
            manager
                .define_function(CustomFunctionDefinition::new("BAD", &["x"], "x +"))
                .is_err()
        );
        assert!(manager.is_empty());
        assert!(!manager.registry().contains("BAD"));
    }

    #[test]
    fn test_missing_arguments_bind_null_and_extras_are_ignored() {
        let mut manager = CustomFunctionManager::new();
        manager
            .define_function(CustomFunctionDefinition::new("PAIR", &["a", "b"], "[a, b]"))
            .unwrap();
        let evaluator = manager.create_sandboxed_evaluator(EvaluationContext::new());
        assert_eq!(
            evaluator.evaluate("PAIR(1)").value,
            Value::from(vec![Value::from(1), Value::Null])
        );
        assert_eq!(evaluator.evaluate("PAIR(1, 2, 3)").value, Value::from(vec![1, 2]));
    }

    #[test]
    fn test_recursive_function_terminates() {
        let mut manager = CustomFunctionManager::new();
        manager
            .define_function(CustomFunctionDefinition::new(
                "FACT",
                &["n"],
                "IF(n <= 1, 1, n * FACT(n - 1))",
            ))
            .unwrap();
        let evaluator = manager.create_sandboxed_evaluator(EvaluationContext::new());
        assert_eq!(evaluator.evaluate("FACT(5)").value, Value::from(120));
    }

    #[test]
    fn test_runaway_recursion_hits_depth_limit() {
        let mut manager = CustomFunctionManager::new();
        manager
            .define_function(CustomFunctionDefinition::new("LOOP", &["n"], "LOOP(n + 1)"))
            .unwrap();
        let evaluator = manager.create_sandboxed_evaluator(EvaluationContext::new());
        let error = evaluator.evaluate("LOOP(0)").error.unwrap();
        assert!(error.contains("Maximum call depth"));
    }

    #[test]
    fn test_remove_restores_shadowed_builtin() {
        let mut manager = CustomFunctionManager::new();
        manager
            .define_function(CustomFunctionDefinition::new("abs", &["x"], "x"))
            .unwrap();
        let evaluator = manager.create_sandboxed_evaluator(EvaluationContext::new());
        assert_eq!(evaluator.evaluate("ABS(-2)").value, Value::from(-2));

        assert!(manager.remove_function("ABS"));
        assert!(!manager.remove_function("ABS"));
        let evaluator = manager.create_sandboxed_evaluator(EvaluationContext::new());
        assert_eq!(evaluator.evaluate("ABS(-2)").value, Value::from(2));
    }

    #[test]
    fn test_import_skips_failures() {
        let mut manager = CustomFunctionManager::new();
        let imported = manager.import_functions(vec![
            CustomFunctionDefinition::new("TWICE", &["x"], "x * 2"),
            CustomFunctionDefinition::new("bad name", &[], "1"),
            CustomFunctionDefinition::new("HALF", &["x"], "x / 2"),
        ]);
        assert_eq!(imported, 2);
        let names: Vec<String> = manager.export_functions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["HALF".to_string(), "TWICE".to_string()]);
    }

    #[test]
    fn test_definitions_round_trip_through_json() {
        let mut manager = CustomFunctionManager::new();
        manager.define_function(score_scale()).unwrap();
        let json = serde_json::to_string(&manager.export_functions()).unwrap();
        assert!(json.contains("\"parameters\""));

        let definitions: Vec<CustomFunctionDefinition> = serde_json::from_str(&json).unwrap();
        let mut restored = CustomFunctionManager::new();
        assert_eq!(restored.import_functions(definitions), 1);
        assert_eq!(restored.definition("score_scale"), manager.definition("SCORE_SCALE"));
    }

    #[test]
    fn test_install_into_existing_evaluator() {
        let mut manager = CustomFunctionManager::new();
        manager
            .define_function(CustomFunctionDefinition::new("INC", &["x"], "x + 1"))
            .unwrap();
        let mut evaluator = FormulaEvaluator::new();
        assert!(evaluator.evaluate("INC(1)").error.is_some());
        manager.install_into(&mut evaluator);
        assert_eq!(evaluator.evaluate("INC(1)").value, Value::from(2));
    }
}
