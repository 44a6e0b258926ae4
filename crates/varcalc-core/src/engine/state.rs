use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use varcalc_engine::Value;

use super::VariableEngine;
use crate::error::Result;

/// Cached variable values keyed by id. Serializes as a plain id -> value map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub values: BTreeMap<String, Value>,
}

impl VariableEngine {
    /// Every registered variable's value keyed by name, evaluating derived
    /// variables as needed. Fails on the first variable that cannot be read.
    pub fn get_all_variables(&self) -> Result<BTreeMap<String, Value>> {
        self.variables()
            .into_iter()
            .map(|variable| Ok((variable.name.clone(), self.get_variable(&variable.id)?)))
            .collect()
    }

    /// Every value currently held: source values and derived values computed
    /// so far. Formulas are not included.
    pub fn export_state(&self) -> Snapshot {
        Snapshot {
            values: self
                .values
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }

    /// Restore values from `snapshot` as-is, without type checks, validation
    /// or re-evaluation. Derived values not in the snapshot but depending on a
    /// restored value are dropped. Unknown ids are skipped.
    pub fn import_state(&mut self, snapshot: Snapshot) {
        let known: Vec<(String, Value)> = snapshot
            .values
            .into_iter()
            .filter(|(id, _)| {
                let known = self.variables.contains_key(id);
                if !known {
                    warn!(id = %id, "skipping snapshot value for unknown variable");
                }
                known
            })
            .collect();

        for (id, _) in &known {
            self.invalidate_dependents(id);
        }
        for (id, value) in known {
            self.values.insert(id, value);
        }
    }
}
