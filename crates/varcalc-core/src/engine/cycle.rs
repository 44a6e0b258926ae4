//! Circular dependency detection over the declared dependency graph.
//!
//! [`VariableEngine::get_variable`](super::VariableEngine::get_variable)
//! catches cycles as they are entered at evaluation time. This module finds
//! them statically, by depth-first search, so a host can report a cycle
//! before anything is read.

use std::collections::{HashMap, HashSet};

/// Detect circular dependencies starting from a variable id.
/// Returns `Some(cycle_path)` if a cycle is reachable, `None` otherwise.
/// The path ends with the id that closes the cycle.
pub fn detect_cycle(
    start: &str,
    dependencies: &HashMap<String, Vec<String>>,
) -> Option<Vec<String>> {
    let mut visiting = HashSet::new();
    let mut path = Vec::new();

    if detect_cycle_dfs(start, dependencies, &mut visiting, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn detect_cycle_dfs<'a>(
    current: &'a str,
    dependencies: &'a HashMap<String, Vec<String>>,
    visiting: &mut HashSet<&'a str>,
    path: &mut Vec<String>,
) -> bool {
    if visiting.contains(current) {
        path.push(current.to_string());
        return true;
    }

    let Some(deps) = dependencies.get(current) else {
        return false;
    };

    visiting.insert(current);
    path.push(current.to_string());

    for dep in deps {
        if detect_cycle_dfs(dep, dependencies, visiting, path) {
            return true;
        }
    }

    path.pop();
    visiting.remove(current);
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(from, to)| (from.to_string(), to.iter().map(|t| t.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_no_cycle() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        assert_eq!(detect_cycle("a", &g), None);
    }

    #[test]
    fn test_three_node_cycle() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let path = detect_cycle("a", &g).unwrap();
        assert_eq!(path, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_self_reference() {
        let g = graph(&[("a", &["a"])]);
        assert_eq!(detect_cycle("a", &g).unwrap(), vec!["a", "a"]);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let g = graph(&[("a", &["b", "c"]), ("b", &["d"]), ("c", &["d"]), ("d", &[])]);
        assert_eq!(detect_cycle("a", &g), None);
    }
}
