//! Error types for varcalc core.

use thiserror::Error;
use varcalc_engine::FormulaError;

use crate::variable::VariableType;

/// Errors raised by the variable engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VariableError {
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Variable name {name} is already used by {existing}")]
    DuplicateName { name: String, existing: String },

    /// `path` lists variable names from the first re-entered variable back to itself.
    #[error("Circular dependency detected: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("Type mismatch for variable {name}: expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: VariableType,
        actual: &'static str,
    },

    #[error("Validation failed for variable {name}: {message}")]
    Validation { name: String, message: String },

    #[error("Variable {0} is computed from a formula and cannot be set")]
    ReadOnly(String),

    #[error("Failed to evaluate variable {name}: {message}")]
    Evaluation { name: String, message: String },

    #[error(transparent)]
    Formula(#[from] FormulaError),
}

impl VariableError {
    /// Whether this error reports a dependency cycle.
    pub fn is_circular(&self) -> bool {
        matches!(self, VariableError::CircularDependency { .. })
    }
}

pub type Result<T> = std::result::Result<T, VariableError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_message_names_the_path() {
        let err = VariableError::CircularDependency {
            path: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a -> b -> a");
        assert!(err.is_circular());
    }

    #[test]
    fn test_formula_errors_convert() {
        let err: VariableError = FormulaError::UnknownFunction("FOO".to_string()).into();
        assert_eq!(err.to_string(), "Unknown function: FOO");
    }
}
