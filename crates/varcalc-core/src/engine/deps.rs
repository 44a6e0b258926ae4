//! Dependency extraction from formula strings.
//!
//! A formula depends on every registered variable whose name appears in it
//! as a plain identifier: outside string literals and not followed by `(`.
//! Names that match no registered variable are ignored here; they fail at
//! evaluation time instead.

use std::collections::HashMap;

use varcalc_engine::extract_references;

/// Ids of the variables `formula` references, in first-occurrence order.
/// `names` maps variable names to ids.
pub fn extract_dependencies(formula: &str, names: &HashMap<String, String>) -> Vec<String> {
    extract_references(formula)
        .into_iter()
        .filter_map(|name| names.get(&name).cloned())
        .collect()
}
