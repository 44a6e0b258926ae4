use std::cell::RefCell;
use tracing::trace;
use varcalc_engine::{Value, VariableSource};

use super::VariableEngine;
use crate::error::{Result, VariableError};
use crate::variable::Variable;

/// Ids being evaluated by one top-level read, outermost first.
type EvaluationStack = RefCell<Vec<String>>;

/// Marks a variable as being evaluated for as long as it lives.
struct EvaluationGuard<'a> {
    stack: &'a EvaluationStack,
    id: String,
}

impl<'a> EvaluationGuard<'a> {
    /// Push `variable` onto the evaluation stack, or fail if it is already
    /// there. `names` resolves the ids on the stack for the error path.
    fn acquire(
        stack: &'a EvaluationStack,
        variable: &Variable,
        names: impl Fn(&str) -> String,
    ) -> Result<Self> {
        let mut ids = stack.borrow_mut();
        if let Some(pos) = ids.iter().position(|id| *id == variable.id) {
            let mut path: Vec<String> = ids[pos..].iter().map(|id| names(id.as_str())).collect();
            path.push(variable.name.clone());
            return Err(VariableError::CircularDependency { path });
        }
        ids.push(variable.id.clone());
        Ok(EvaluationGuard {
            stack,
            id: variable.id.clone(),
        })
    }
}

impl Drop for EvaluationGuard<'_> {
    fn drop(&mut self) {
        let mut ids = self.stack.borrow_mut();
        if let Some(pos) = ids.iter().rposition(|id| *id == self.id) {
            ids.remove(pos);
        }
    }
}

/// Resolves formula identifiers to variable values by reading back through
/// the engine on the same evaluation stack. The first failure is kept so it
/// can be reported in place of the evaluator's less specific message.
struct EngineLookup<'a> {
    engine: &'a VariableEngine,
    stack: &'a EvaluationStack,
    failure: RefCell<Option<VariableError>>,
}

impl VariableSource for EngineLookup<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        let id = self.engine.names.get(name)?;
        if self.failure.borrow().is_some() {
            return None;
        }
        match self.engine.read_variable(id, self.stack) {
            Ok(value) => Some(value),
            Err(err) => {
                *self.failure.borrow_mut() = Some(err);
                None
            }
        }
    }
}

impl VariableEngine {
    /// Current value of the variable `id`.
    ///
    /// Source variables return their stored value (`null` if none). Derived
    /// variables return their cached value, or evaluate their formula,
    /// reading referenced variables recursively, and cache the result.
    /// Re-entering a variable that is already being evaluated by the same
    /// read fails with [`VariableError::CircularDependency`]. Concurrent
    /// reads from other threads never see each other's evaluations.
    pub fn get_variable(&self, id: &str) -> Result<Value> {
        self.read_variable(id, &EvaluationStack::default())
    }

    fn read_variable(&self, id: &str, stack: &EvaluationStack) -> Result<Value> {
        let variable = self
            .variables
            .get(id)
            .ok_or_else(|| VariableError::UnknownVariable(id.to_string()))?;

        if let Some(value) = self.values.get(id) {
            return Ok(value.clone());
        }
        let Some(formula) = variable.formula.as_deref() else {
            return Ok(Value::Null);
        };

        let _guard = EvaluationGuard::acquire(stack, variable, |id| {
            self.variables
                .get(id)
                .map_or_else(|| id.to_string(), |v| v.name.clone())
        })?;

        let lookup = EngineLookup {
            engine: self,
            stack,
            failure: RefCell::new(None),
        };
        let result = self.evaluator.evaluate_with(formula, &lookup);
        if let Some(err) = lookup.failure.into_inner() {
            return Err(err);
        }
        if let Some(message) = result.error {
            return Err(VariableError::Evaluation {
                name: variable.name.clone(),
                message,
            });
        }

        trace!(variable = %variable.name, value = %result.value, "evaluated derived variable");
        self.values.insert(id.to_string(), result.value.clone());
        Ok(result.value)
    }

    /// Like [`get_variable`](Self::get_variable), addressed by name.
    pub fn get_variable_by_name(&self, name: &str) -> Result<Value> {
        let id = self
            .names
            .get(name)
            .ok_or_else(|| VariableError::UnknownVariable(name.to_string()))?;
        self.get_variable(id)
    }
}
