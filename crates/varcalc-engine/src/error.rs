//! Error types for the formula engine.

use thiserror::Error;

/// Errors raised while parsing or evaluating a formula, or while defining a
/// custom function.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Undefined identifier: {0}")]
    UndefinedIdentifier(String),

    #[error("Error in function {name}: {message}")]
    Function { name: String, message: String },

    #[error("Failed to evaluate expression \"{expression}\": {cause}")]
    Expression {
        expression: String,
        cause: Box<FormulaError>,
    },

    #[error("Maximum call depth of {0} exceeded")]
    CallDepthExceeded(usize),

    #[error("Invalid function name: {0}")]
    InvalidFunctionName(String),

    #[error("Invalid parameter name \"{parameter}\" in function {function}")]
    InvalidParameterName { function: String, parameter: String },

    #[error("Duplicate parameter name \"{parameter}\" in function {function}")]
    DuplicateParameter { function: String, parameter: String },

    /// Raised by function implementations; the caller attaches the function name.
    #[error("{0}")]
    Runtime(String),
}

impl FormulaError {
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        FormulaError::Parse {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        FormulaError::Runtime(message.into())
    }
}

pub type Result<T> = std::result::Result<T, FormulaError>;
