//! The variable engine: a registry of named values, some derived from
//! formulas over the others.
//!
//! Derived values are computed lazily on read and cached. Writing a source
//! variable drops the cached values of everything that transitively depends
//! on it, found through a reverse-dependency map rebuilt on registration.

mod cycle;
mod deps;
mod eval;
mod ops;
mod state;

pub use cycle::detect_cycle;
pub use deps::extract_dependencies;
pub use state::Snapshot;

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use varcalc_engine::{EvaluationContext, FormulaEvaluator, Value};

use crate::variable::Variable;

/// Owns variable definitions, their cached values and the evaluator used for
/// formulas. Independent instances share no state.
#[derive(Debug)]
pub struct VariableEngine {
    /// Definitions by id.
    variables: HashMap<String, Variable>,
    /// Name -> id.
    names: HashMap<String, String>,
    /// Cached values by id: sources hold their current value, derived
    /// variables hold their last successful evaluation.
    values: DashMap<String, Value>,
    /// Id -> ids its formula references.
    dependencies: HashMap<String, Vec<String>>,
    /// Reverse dependency map: id -> ids whose formulas reference it.
    dependents: HashMap<String, HashSet<String>>,
    evaluator: FormulaEvaluator,
}

impl VariableEngine {
    /// Engine with a default evaluator (all built-ins, empty context).
    pub fn new() -> Self {
        Self::with_evaluator(FormulaEvaluator::new())
    }

    pub fn with_context(context: EvaluationContext) -> Self {
        Self::with_evaluator(FormulaEvaluator::with_context(context))
    }

    pub fn with_evaluator(evaluator: FormulaEvaluator) -> Self {
        VariableEngine {
            variables: HashMap::new(),
            names: HashMap::new(),
            values: DashMap::new(),
            dependencies: HashMap::new(),
            dependents: HashMap::new(),
            evaluator,
        }
    }

    /// The definition registered under `id`.
    pub fn variable(&self, id: &str) -> Option<&Variable> {
        self.variables.get(id)
    }

    /// The definition registered under `name`.
    pub fn variable_by_name(&self, name: &str) -> Option<&Variable> {
        self.names.get(name).and_then(|id| self.variables.get(id))
    }

    /// All definitions, sorted by name.
    pub fn variables(&self) -> Vec<&Variable> {
        let mut all: Vec<_> = self.variables.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Ids that `id`'s formula references directly.
    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.dependencies.get(id).cloned().unwrap_or_default()
    }

    /// Ids whose formulas reference `id` directly, sorted.
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .dependents
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn evaluator(&self) -> &FormulaEvaluator {
        &self.evaluator
    }

    /// Mutable access to the evaluator. Cached derived values are dropped,
    /// since functions or context may change.
    pub fn evaluator_mut(&mut self) -> &mut FormulaEvaluator {
        self.clear_derived_values();
        &mut self.evaluator
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub(crate) fn rebuild_dependents(&mut self) {
        self.dependencies.clear();
        self.dependents.clear();
        for (id, variable) in &self.variables {
            let Some(formula) = variable.formula.as_deref() else {
                continue;
            };
            let deps = extract_dependencies(formula, &self.names);
            for dep in &deps {
                self.dependents
                    .entry(dep.clone())
                    .or_default()
                    .insert(id.clone());
            }
            self.dependencies.insert(id.clone(), deps);
        }
    }
}

impl Default for VariableEngine {
    fn default() -> Self {
        Self::new()
    }
}
