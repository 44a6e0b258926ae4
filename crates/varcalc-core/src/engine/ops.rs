use std::collections::HashSet;
use tracing::{debug, trace};
use varcalc_engine::{ContextUpdate, CustomFunctionManager, Value};

use super::{VariableEngine, detect_cycle};
use crate::error::{Result, VariableError};
use crate::variable::Variable;

impl VariableEngine {
    /// Add or replace a variable definition.
    ///
    /// Source variables are seeded with their `default_value`; derived
    /// variables are evaluated on first read. The cached values of the
    /// variable and everything depending on it are dropped.
    pub fn register_variable(&mut self, variable: Variable) -> Result<()> {
        if let Some(existing) = self
            .names
            .get(&variable.name)
            .filter(|existing| **existing != variable.id)
        {
            return Err(VariableError::DuplicateName {
                name: variable.name.clone(),
                existing: existing.clone(),
            });
        }

        if let Some(previous) = self.variables.remove(&variable.id) {
            self.names.remove(&previous.name);
        }
        let id = variable.id.clone();
        debug!(
            id = %id,
            name = %variable.name,
            derived = variable.is_derived(),
            "registering variable"
        );

        self.names.insert(variable.name.clone(), id.clone());
        self.values.remove(&id);
        if !variable.is_derived() {
            if let Some(default) = &variable.default_value {
                self.values.insert(id.clone(), default.clone());
            }
        }
        self.variables.insert(id.clone(), variable);

        self.rebuild_dependents();
        self.invalidate_dependents(&id);
        Ok(())
    }

    /// Remove a variable. Formulas that referenced it fail on their next read.
    pub fn unregister_variable(&mut self, id: &str) -> Option<Variable> {
        let variable = self.variables.remove(id)?;
        self.names.remove(&variable.name);
        self.values.remove(id);
        self.invalidate_dependents(id);
        self.rebuild_dependents();
        Some(variable)
    }

    /// Store a new value for the source variable `id`.
    ///
    /// Fails for unknown ids, for derived variables, for values the declared
    /// type does not accept and for values the validation rules reject.
    /// On success every transitive dependent's cached value is dropped.
    pub fn set_variable(&mut self, id: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let variable = self
            .variables
            .get(id)
            .ok_or_else(|| VariableError::UnknownVariable(id.to_string()))?;

        if variable.is_derived() {
            return Err(VariableError::ReadOnly(variable.name.clone()));
        }
        if !variable.var_type.accepts(&value) {
            return Err(VariableError::TypeMismatch {
                name: variable.name.clone(),
                expected: variable.var_type,
                actual: value.kind(),
            });
        }
        if let Some(rules) = &variable.validation {
            rules.check(&value).map_err(|message| VariableError::Validation {
                name: variable.name.clone(),
                message,
            })?;
        }

        self.values.insert(id.to_string(), value);
        self.invalidate_dependents(id);
        Ok(())
    }

    /// Like [`set_variable`](Self::set_variable), addressed by name.
    pub fn set_variable_by_name(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let id = self
            .names
            .get(name)
            .cloned()
            .ok_or_else(|| VariableError::UnknownVariable(name.to_string()))?;
        self.set_variable(&id, value)
    }

    /// Apply a context change (clock, seed, static variables) and drop every
    /// derived value so it is recomputed under the new context.
    pub fn update_context(&mut self, update: ContextUpdate) {
        self.evaluator.update_context(update);
        self.clear_derived_values();
    }

    /// Make every function defined in `manager` callable from formulas.
    pub fn install_custom_functions(&mut self, manager: &CustomFunctionManager) {
        manager.install_into(&mut self.evaluator);
        self.clear_derived_values();
    }

    /// Report the first dependency cycle among registered formulas, sorted
    /// by id, without evaluating anything.
    pub fn check_cycles(&self) -> Result<()> {
        let mut ids: Vec<&String> = self.dependencies.keys().collect();
        ids.sort();
        for id in ids {
            if let Some(path) = detect_cycle(id, &self.dependencies) {
                let path = path
                    .iter()
                    .map(|id| {
                        self.variables
                            .get(id)
                            .map_or_else(|| id.clone(), |v| v.name.clone())
                    })
                    .collect();
                return Err(VariableError::CircularDependency { path });
            }
        }
        Ok(())
    }

    /// Drop cached values of every variable that transitively depends on `changed`.
    pub(crate) fn invalidate_dependents(&self, changed: &str) {
        let mut to_process = vec![changed.to_string()];
        let mut visited = HashSet::new();
        while let Some(id) = to_process.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            if let Some(deps) = self.dependents.get(&id) {
                for dep in deps {
                    if self.values.remove(dep).is_some() {
                        trace!(variable = %dep, cause = %changed, "invalidated cached value");
                    }
                    to_process.push(dep.clone());
                }
            }
        }
    }

    /// Drop the cached value of every derived variable.
    pub(crate) fn clear_derived_values(&self) {
        self.values.retain(|id, _| {
            self.variables
                .get(id)
                .is_none_or(|variable| !variable.is_derived())
        });
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::VariableEngine;
    use crate::error::VariableError;
    use crate::validation::ValidationRules;
    use crate::variable::{Variable, VariableType};
    use varcalc_engine::{
        ContextUpdate, CustomFunctionDefinition, CustomFunctionManager, EvaluationContext, Value,
    };

    fn chain() -> VariableEngine {
        let mut engine = VariableEngine::new();
        engine
            .register_variable(Variable::source("base", VariableType::Number, 10))
            .unwrap();
        engine
            .register_variable(Variable::derived("doubled", VariableType::Number, "base * 2"))
            .unwrap();
        engine
            .register_variable(Variable::derived("plusOne", VariableType::Number, "doubled + 1"))
            .unwrap();
        engine
    }

    #[test]
    fn test_set_invalidates_transitive_dependents() {
        let mut engine = chain();
        assert_eq!(engine.get_variable("plusOne").unwrap(), Value::from(21));

        engine.set_variable("base", 5).unwrap();
        assert_eq!(engine.get_variable("doubled").unwrap(), Value::from(10));
        assert_eq!(engine.get_variable("plusOne").unwrap(), Value::from(11));
    }

    #[test]
    fn test_registration_order_does_not_matter() {
        let mut engine = VariableEngine::new();
        engine
            .register_variable(Variable::derived("total", VariableType::Number, "a + b"))
            .unwrap();
        engine
            .register_variable(Variable::source("a", VariableType::Number, 1))
            .unwrap();
        engine
            .register_variable(Variable::source("b", VariableType::Number, 2))
            .unwrap();
        assert_eq!(engine.dependencies_of("total"), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(engine.dependents_of("a"), vec!["total".to_string()]);
        assert_eq!(engine.get_variable("total").unwrap(), Value::from(3));
    }

    #[test]
    fn test_derived_variables_are_read_only() {
        let mut engine = chain();
        assert_eq!(
            engine.set_variable("doubled", 3).unwrap_err(),
            VariableError::ReadOnly("doubled".to_string())
        );
    }

    #[test]
    fn test_type_mismatch_rejected_and_value_kept() {
        let mut engine = chain();
        let err = engine.set_variable("base", "ten").unwrap_err();
        assert_eq!(
            err,
            VariableError::TypeMismatch {
                name: "base".to_string(),
                expected: VariableType::Number,
                actual: "string",
            }
        );
        assert_eq!(engine.get_variable("base").unwrap(), Value::from(10));
        engine.set_variable("base", Value::Null).unwrap();
    }

    #[test]
    fn test_validation_rules_enforced() {
        let mut engine = VariableEngine::new();
        engine
            .register_variable(
                Variable::source("rating", VariableType::Number, 3)
                    .with_validation(ValidationRules::new().range(1.0, 5.0)),
            )
            .unwrap();
        let err = engine.set_variable("rating", 9).unwrap_err();
        assert_eq!(err.to_string(), "Validation failed for variable rating: must be at most 5");
        engine.set_variable("rating", 4).unwrap();
    }

    #[test]
    fn test_unknown_id_on_set() {
        let mut engine = VariableEngine::new();
        assert!(matches!(
            engine.set_variable("nope", 1),
            Err(VariableError::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut engine = VariableEngine::new();
        engine
            .register_variable(Variable::new("v1", "score", VariableType::Number))
            .unwrap();
        let err = engine
            .register_variable(Variable::new("v2", "score", VariableType::Number))
            .unwrap_err();
        assert!(matches!(err, VariableError::DuplicateName { .. }));
    }

    #[test]
    fn test_reregistering_replaces_formula() {
        let mut engine = chain();
        assert_eq!(engine.get_variable("plusOne").unwrap(), Value::from(21));
        engine
            .register_variable(Variable::derived("doubled", VariableType::Number, "base * 3"))
            .unwrap();
        assert_eq!(engine.get_variable("plusOne").unwrap(), Value::from(31));
    }

    #[test]
    fn test_unregister_breaks_dependents() {
        let mut engine = chain();
        assert!(engine.unregister_variable("base").is_some());
        assert!(engine.get_variable("doubled").is_err());
        assert!(engine.unregister_variable("base").is_none());
    }

    #[test]
    fn test_check_cycles_reports_without_evaluating() {
        let mut engine = chain();
        assert!(engine.check_cycles().is_ok());
        engine
            .register_variable(Variable::derived("p", VariableType::Number, "q"))
            .unwrap();
        engine
            .register_variable(Variable::derived("q", VariableType::Number, "p"))
            .unwrap();
        let err = engine.check_cycles().unwrap_err();
        assert_eq!(err.to_string(), "Circular dependency detected: p -> q -> p");
    }

    #[test]
    fn test_update_context_recomputes_time_dependent_values() {
        let mut engine =
            VariableEngine::with_context(EvaluationContext::new().with_current_time(1_000.0));
        engine
            .register_variable(Variable::source("onset", VariableType::StimulusOnset, 400))
            .unwrap();
        engine
            .register_variable(Variable::derived(
                "elapsed",
                VariableType::ReactionTime,
                "TIME_SINCE(onset)",
            ))
            .unwrap();
        assert_eq!(engine.get_variable("elapsed").unwrap(), Value::from(600));

        engine.update_context(ContextUpdate {
            current_time: Some(Some(1_500.0)),
            ..Default::default()
        });
        assert_eq!(engine.get_variable("elapsed").unwrap(), Value::from(1_100));
        assert_eq!(engine.get_variable("onset").unwrap(), Value::from(400));
    }

    #[test]
    fn test_custom_functions_in_variable_formulas() {
        let mut manager = CustomFunctionManager::new();
        manager
            .define_function(CustomFunctionDefinition::new(
                "PCT",
                &["part", "whole"],
                "part / whole * 100",
            ))
            .unwrap();

        let mut engine = VariableEngine::new();
        engine
            .register_variable(Variable::source("correct", VariableType::Number, 18))
            .unwrap();
        engine
            .register_variable(Variable::derived(
                "accuracy",
                VariableType::Number,
                "PCT(correct, 24)",
            ))
            .unwrap();
        assert!(engine.get_variable("accuracy").is_err());

        engine.install_custom_functions(&manager);
        assert_eq!(engine.get_variable("accuracy").unwrap(), Value::from(75));
    }

    #[test]
    fn test_engines_are_independent() {
        let mut first = chain();
        let second = chain();
        first.set_variable("base", 1).unwrap();
        assert_eq!(first.get_variable("plusOne").unwrap(), Value::from(3));
        assert_eq!(second.get_variable("plusOne").unwrap(), Value::from(21));
    }
}
